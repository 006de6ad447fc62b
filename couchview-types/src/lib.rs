//! Core type definitions for couchview.
//!
//! This crate holds the plain data that every other couchview crate speaks:
//! - [`Document`]: a stored JSON document with its `_id`, `_rev` and type discriminator
//! - [`MapFunction`], [`ReduceFunction`], [`Guard`]: the typed index function builder
//! - [`ViewDefinition`]: a named view synthesized from field names or custom functions
//! - [`DesignDocument`]: the persisted container of all view functions of a namespace
//! - [`QueryParams`], [`ViewResponse`], [`ViewRow`]: the view query wire shapes
//!
//! Nothing here performs I/O. Rendering of function source is deterministic so
//! definitions can be compared against what a store already holds.

mod design;
mod document;
mod function;
mod query;
mod view;

pub use design::{design_id, DesignDocument, DESIGN_PREFIX, VIEW_LANGUAGE};
pub use document::{Document, TYPE_FIELD};
pub use function::{Guard, MapFunction, ReduceFunction};
pub use query::{QueryParams, Stale, ViewResponse, ViewRow};
pub use view::{view_name, ViewDefaults, ViewDefinition, ViewFunctions, ViewOptions, ALL_VIEW};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or encoding view types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("a view needs at least one key or an explicit name")]
    EmptyKeys,
}
