//! Error types for lrucache

use std::io;

use thiserror::Error;

/// Result type alias for lrucache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
#[derive(Debug, Error)]
pub enum Error {
    /// Capacity must be at least one entry
    #[error("Invalid capacity: {0} (must be greater than 0)")]
    InvalidCapacity(usize),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cache changed while an iterator was walking it
    #[error("Cache modified during iteration (expected version {expected}, found {found})")]
    ConcurrentModification {
        /// Version captured when the iterator was created
        expected: u64,
        /// Version observed on the failing step
        found: u64,
    },

    /// Snapshot frame is malformed or truncated
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Key or value payload could not be encoded/decoded
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => Error::Snapshot("Truncated snapshot".to_string()),
            nom::Err::Error(e) | nom::Err::Failure(e) => Error::Snapshot(format!(
                "{:?} at {} bytes before end of input",
                e.code,
                e.input.len()
            )),
        }
    }
}
