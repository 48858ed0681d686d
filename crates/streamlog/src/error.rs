use std::io;

use thiserror::Error;

/// Error opening a [`StreamLog`](crate::StreamLog) from its backing.
#[derive(Debug, Error)]
pub enum Open {
    #[error("failed to decode record at line {line}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("out-of-order record: expected index {expected}, found {actual}")]
    OutOfOrder { expected: u64, actual: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Error returned by [`Publisher::publish`](crate::Publisher::publish).
///
/// An `Io` failure means the record may or may not have reached the backing;
/// the in-memory log does **not** retain it either way.
#[derive(Debug, Error)]
pub enum Append {
    #[error("failed to encode record")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The exclusive publisher capability is already held elsewhere.
#[derive(Debug, Error)]
#[error("stream publisher is already taken")]
pub struct PublisherTaken;
