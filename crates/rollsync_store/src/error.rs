//! Error types for store operations.

use rollsync_model::Collection;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing local state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted state could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another process holds the state directory.
    #[error("state directory is locked by another process: {0}")]
    Locked(PathBuf),

    /// The state directory does not exist.
    #[error("state directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    /// Persisted state is damaged beyond the tolerated torn tail.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// A journal refuses writes because an earlier write left it in an
    /// unknown state. Reopening the store replays it from disk.
    #[error("journal {0} refuses writes after a failed write; reopen the store")]
    Poisoned(String),

    /// A cursor value outside the valid range was written.
    #[error("invalid cursor {value} for {collection}: timestamps must be >= 0")]
    InvalidCursor {
        /// Collection being written.
        collection: Collection,
        /// Rejected value.
        value: i64,
    },

    /// A cursor write would move the cursor backwards.
    #[error("cursor for {collection} cannot move from {current} back to {attempted}")]
    CursorRegression {
        /// Collection being written.
        collection: Collection,
        /// Currently persisted value.
        current: i64,
        /// Rejected value.
        attempted: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::CursorRegression {
            collection: Collection::Resources,
            current: 20,
            attempted: 10,
        };
        assert_eq!(
            err.to_string(),
            "cursor for resources cannot move from 20 back to 10"
        );

        let err = StoreError::InvalidCursor {
            collection: Collection::ActivityEvents,
            value: -1,
        };
        assert!(err.to_string().contains("activityEvents"));
    }
}
