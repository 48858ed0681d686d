use chronik_streamlog::{IdxTs, Micros, Publisher, StreamLog};
use log::{debug, trace};

use crate::error::{ReplayError, StorageError};
use crate::fields::StorageFields;
use crate::transaction::TransactionRecord;

/// The stream record type a storage over mutation variant `M` persists.
pub type Stream<M> = StreamLog<TransactionRecord<M>>;

/// Rebuild `fields` by dispatching every mutation of every record in the
/// log, oldest first. Returns the record count and the last record's
/// timestamp ([`Micros::ZERO`] for an empty log).
///
/// This is the same dispatch path the follower subscription uses for live
/// records; state reconstruction has exactly one implementation.
pub(crate) fn replay<F: StorageFields>(
    stream: &Stream<F::Mutation>,
    fields: &mut F,
) -> Result<(u64, Micros), ReplayError> {
    let records = stream.read_from(0);
    let count = records.len() as u64;
    let mut last_us = Micros::ZERO;
    for (_, record) in records {
        for mutation in record.mutations {
            fields.dispatch(mutation)?;
        }
        last_us = record.us;
    }
    if count > 0 {
        debug!("replayed {count} transaction records into {}", F::STORAGE_NAME);
    }
    fields.clock().observe(last_us);
    Ok((count, last_us))
}

/// Persist the journaled mutations of one committed transaction as a single
/// atomically published [`TransactionRecord`], leaving the journal empty.
///
/// An empty journal publishes nothing (its meta-fields, if any, are
/// discarded with it). On append failure the in-memory state intentionally
/// stays applied; see the failure model notes on
/// [`StorageError::CannotAppendToLog`].
pub(crate) fn persist_journal<F: StorageFields>(
    publisher: &mut Publisher<TransactionRecord<F::Mutation>>,
    fields: &mut F,
) -> Result<Option<IdxTs>, StorageError> {
    if fields.journal().is_empty() {
        fields.journal().clear();
        return Ok(None);
    }
    let us = fields.clock().now();
    let (meta, mutations) = fields.journal().take_for_commit();
    let mutation_count = mutations.len();
    let record = TransactionRecord { meta, us, mutations };
    let idxts = publisher
        .publish(record, us)
        .map_err(StorageError::CannotAppendToLog)?;
    trace!("persisted {mutation_count} mutations as record {}", idxts.index);
    Ok(Some(idxts))
}
