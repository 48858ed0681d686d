use chronik_streamlog::error as stream_error;
use thiserror::Error;

/// Errors surfaced by the storage shell and transaction policy.
///
/// None of these are retried internally; retry is a caller concern.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A read-write transaction was attempted on a follower storage.
    #[error("read-write transaction attempted on a follower storage")]
    ReadWriteInFollower,

    /// The storage has been shut down; all further transactions fail fast.
    #[error("storage is shutting down")]
    StorageIsDestructing,

    /// The persister failed to append a transaction record.
    ///
    /// The in-memory mutations of the failed transaction are deliberately
    /// left applied; the log may be behind the state. Recovery is process
    /// restart and replay.
    #[error("cannot append to the transaction log")]
    CannotAppendToLog(#[source] stream_error::Append),

    /// The log replayed into an inconsistent state; the storage is unusable.
    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("failed to open the underlying stream")]
    OpenStream(#[from] stream_error::Open),

    #[error("failed to start the follower subscription")]
    Subscribe(#[source] std::io::Error),

    #[error(transparent)]
    PublisherTaken(#[from] stream_error::PublisherTaken),
}

/// Fatal defect detected while replaying the log.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("replayed `{event}` for field `{field}` references unknown key {key}")]
    IntegrityViolation {
        field: &'static str,
        event: &'static str,
        key: String,
    },
}

impl ReplayError {
    pub fn integrity(field: &'static str, event: &'static str, key: String) -> Self {
        Self::IntegrityViolation { field, event, key }
    }
}
