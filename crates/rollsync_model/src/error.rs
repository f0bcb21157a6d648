//! Error types for record decoding.

use crate::collection::Collection;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while decoding records.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A response body could not be decoded into records.
    #[error("failed to decode {collection} batch: {source}")]
    Decode {
        /// Collection the body was fetched for.
        collection: Collection,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A collection name did not match any known collection.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
}
