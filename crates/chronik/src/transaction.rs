use std::collections::BTreeMap;

use chronik_streamlog::Micros;
use serde::{Deserialize, Serialize};

/// Free-form annotations a transaction may attach to its persisted record.
pub type TransactionMetaFields = BTreeMap<String, String>;

/// One committed transaction, as appended to the stream: its meta-fields, its
/// commit timestamp, and every mutation in invocation order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord<M> {
    pub meta: TransactionMetaFields,
    pub us: Micros,
    pub mutations: Vec<M>,
}

/// Outcome of a transaction whose closure ran to completion.
///
/// Policy-level failures ([`StorageError`](crate::StorageError)) and panics
/// are not folded into this sum; they surface through the outer `Result` and
/// the unwind respectively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionResult<T> {
    Committed(T),
    RolledBack(Option<T>),
}

impl<T> TransactionResult<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// The committed value, if the transaction committed.
    pub fn committed(self) -> Option<T> {
        match self {
            Self::Committed(value) => Some(value),
            Self::RolledBack(_) => None,
        }
    }
}

/// Signal returned by a read-write closure to abort the transaction.
///
/// The policy rolls the journal back and reports
/// [`TransactionResult::RolledBack`] carrying the optional value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rollback<T> {
    WithValue(T),
    NoValue,
}
