//! Error taxonomy for storage operations (spec §7).
//!
//! Every fallible journal/document-store operation returns a plain
//! `Result<T, StorageError>`, mirroring how `eventually-core::store::EventStore`
//! associates a single `Error` type with an `AppendError` trait bound
//! (`eventually-core/src/store.rs` / `eventually/src/store.rs`). The
//! variants below enumerate the full discriminator set from spec §7 rather
//! than leaving conflict-detection to a trait, since the taxonomy here
//! covers more than just concurrency.

use thiserror::Error;

/// Discriminated outcome of a storage operation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Expected-version mismatch on append.
    #[error("concurrency violation: expected version {expected}, stream is at {actual}")]
    ConcurrencyViolation { expected: u64, actual: u64 },

    /// Append or read against a tombstoned stream.
    #[error("stream '{0}' has been tombstoned")]
    StreamDeleted(String),

    /// Re-tombstoning an already-tombstoned stream.
    #[error("stream '{0}' is already tombstoned")]
    AlreadyTombstoned(String),

    /// Read of a nonexistent stream or document.
    #[error("'{0}' was not found")]
    NotFound(String),

    /// Batch read where some items are missing.
    #[error("not all requested items were found: {0} of {1} missing")]
    NotAllFound(usize, usize),

    /// The type/category itself has never been written.
    #[error("no store exists for type '{0}'")]
    NoTypeStore(String),

    /// Known, expected failure condition other than the above.
    #[error("operation failed: {0}")]
    Failure(String),

    /// Unexpected failure; wraps the underlying cause.
    #[error("unexpected storage error: {0}")]
    Error(#[source] anyhow::Error),
}

impl StorageError {
    /// `true` for the subset of variants a caller should retry after
    /// refreshing its view of the stream.
    pub fn is_concurrency_violation(&self) -> bool {
        matches!(self, StorageError::ConcurrencyViolation { .. })
    }
}

/// Result of a successful append: the new stream version and the
/// contiguous run of global positions assigned to the appended entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    pub stream_version: u64,
    pub first_global_position: u64,
    pub last_global_position: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_violation_is_identified() {
        let err = StorageError::ConcurrencyViolation {
            expected: 2,
            actual: 5,
        };
        assert!(err.is_concurrency_violation());
        assert!(!StorageError::NotFound("x".into()).is_concurrency_violation());
    }
}
