//! Error types for store connections.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a store connection.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport failure talking to the store.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success response not covered by a more specific variant.
    #[error("store returned status {status}: {body}")]
    Http { status: u16, body: String },

    /// Document, design document or view not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Revision conflict on write.
    #[error("document update conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection cannot run the requested operation.
    #[error("unsupported by this store: {0}")]
    Unsupported(String),

    /// Document rejected before it reached the store.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Connection settings are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<couchview_types::Error> for StoreError {
    fn from(err: couchview_types::Error) -> Self {
        match err {
            couchview_types::Error::Serialization(e) => Self::Serialization(e),
            other => Self::InvalidDocument(other.to_string()),
        }
    }
}
