//! Storage facade error type.

use thiserror::Error;

/// Errors from the storage facade and its backends.
///
/// Handlers map these onto HTTP statuses: `NoBackend`/`TargetNotFound`
/// become 404, `OutOfRange` 400, everything else 500.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The requested backend (flash or block) is not configured.
    #[error("no {0} backend configured")]
    NoBackend(&'static str),

    /// No partition with the requested name.
    #[error("target not found: {0}")]
    TargetNotFound(String),

    /// Operation window falls outside the target.
    #[error("range {offset:#x}+{len:#x} outside target of {size:#x} bytes")]
    OutOfRange {
        /// Requested start offset.
        offset: u64,
        /// Requested length.
        len: u64,
        /// Target size.
        size: u64,
    },

    /// Too many bad blocks to satisfy the operation inside the target.
    #[error("ran out of good blocks at {offset:#x}")]
    BadBlockExhausted {
        /// Physical offset where the walk hit the end of the window.
        offset: u64,
    },

    /// Backend I/O failure.
    #[error("storage i/o: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
