//! Error types for model-level view operations.

use couchview_design::DesignError;
use couchview_store::StoreError;
use std::fmt::Display;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur declaring or querying a model's views.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Neither the query nor the model names a database.
    #[error("no database configured for {model}")]
    NoDatabase { model: String },

    /// The model never declared this view.
    #[error("view {name} is not declared by {model}")]
    NotFound { model: String, name: String },

    /// `reduce` requested on a view without a reduce function.
    #[error("view {name} has no reduce function")]
    CannotReduce { name: String },

    /// The materializer rejected a document.
    #[error("cannot materialize document: {0}")]
    Materialize(String),

    /// Invalid view declaration.
    #[error("invalid view definition: {0}")]
    Definition(#[from] couchview_types::Error),

    #[error(transparent)]
    Design(DesignError),

    /// Store error, surfaced unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ModelError {
    pub fn materialize(err: impl Display) -> Self {
        Self::Materialize(err.to_string())
    }
}

impl From<DesignError> for ModelError {
    fn from(err: DesignError) -> Self {
        match err {
            DesignError::Store(e) => Self::Store(e),
            other => Self::Design(other),
        }
    }
}
