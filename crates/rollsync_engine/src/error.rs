//! Error types for the sync engine.

use rollsync_model::{Collection, ModelError, RecordKey};
use rollsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can end a sync cycle.
///
/// Every error is scoped to one collection's cycle. None of them advance the
/// cursor.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The credential was rejected (HTTP 401/403). Re-authenticate; the
    /// cursor is unchanged.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network failure, timeout or 5xx. Retry later with the same cursor.
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// The API rejected the request (4xx other than auth). Not retryable
    /// without operator intervention.
    #[error("request rejected with status {status}: {message}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// A record could not be applied locally. The batch is retried next
    /// cycle.
    #[error(transparent)]
    RecordApply(#[from] RecordApplyError),

    /// Cursor persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The API answered with something that breaks its contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The cycle was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Another cycle for the same collection is running.
    #[error("a sync cycle for {0} is already running")]
    CycleInProgress(Collection),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Returns true if a later cycle with the same cursor may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Auth(_)
            | SyncError::TransientFetch(_)
            | SyncError::RecordApply(_)
            | SyncError::Storage(_)
            | SyncError::Cancelled
            | SyncError::CycleInProgress(_) => true,
            SyncError::Request { .. } | SyncError::Protocol(_) | SyncError::Config(_) => false,
        }
    }

    /// Returns true if the credential should be refreshed before retrying.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, SyncError::Auth(_))
    }
}

impl From<ModelError> for SyncError {
    fn from(err: ModelError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

/// A single record was rejected by the local store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to apply {key}: {reason}")]
pub struct RecordApplyError {
    /// Natural key of the offending record.
    pub key: RecordKey,
    /// Why it was rejected.
    pub reason: String,
}

impl RecordApplyError {
    /// Creates a new apply error.
    pub fn new(key: RecordKey, reason: impl Into<String>) -> Self {
        Self {
            key,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::TransientFetch("connection reset".into()).is_retryable());
        assert!(SyncError::Auth("expired".into()).is_retryable());
        assert!(SyncError::Cancelled.is_retryable());
        assert!(!SyncError::Request {
            status: 400,
            message: "bad ts".into()
        }
        .is_retryable());
        assert!(!SyncError::Protocol("not an array".into()).is_retryable());
    }

    #[test]
    fn reauth_only_for_auth() {
        assert!(SyncError::Auth("401".into()).requires_reauth());
        assert!(!SyncError::TransientFetch("503".into()).requires_reauth());
    }

    #[test]
    fn record_apply_error_names_key() {
        let err: SyncError =
            RecordApplyError::new(RecordKey::Resource("a".into()), "empty title").into();
        assert_eq!(err.to_string(), "failed to apply resource:a: empty title");
        assert!(err.is_retryable());
    }

    #[test]
    fn decode_error_is_protocol() {
        let model_err = rollsync_model::decode_batch(Collection::Resources, b"{}").unwrap_err();
        let err: SyncError = model_err.into();
        assert!(matches!(err, SyncError::Protocol(_)));
    }
}
