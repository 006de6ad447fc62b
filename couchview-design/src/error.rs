//! Error types for the design registry.

use couchview_store::StoreError;
use thiserror::Error;

/// Result type for registry operations.
pub type DesignResult<T> = Result<T, DesignError>;

/// Errors that can occur defining, publishing or querying views.
#[derive(Debug, Error)]
pub enum DesignError {
    /// View name unknown to the registry.
    #[error("view not found: {name}")]
    NotFound { name: String },

    /// A model redefined a view with different functions under `ConflictPolicy::Reject`.
    #[error("view {name} of {model} is already defined differently")]
    Conflict { name: String, model: String },

    /// The store holds different functions for views of this design document.
    #[error("design document {design} conflicts with the store on {views:?}")]
    PublishConflict { design: String, views: Vec<String> },

    /// Store error, surfaced unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}
