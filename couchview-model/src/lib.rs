//! Model-level views for couchview.
//!
//! A [`Model`] declares views by field name and queries them by view name:
//! - [`Model::declare_view`] synthesizes a guarded view into the model's
//!   design registry without touching the store
//! - [`Model::view`] publishes the registry if needed, runs the view and
//!   returns rows, a reduced value or materialized instances
//! - [`Model::view_with`] streams the same items to a consumer
//! - [`Model::first_from_view`] returns the first match of a key lookup
//!
//! Per-model state lives in [`ModelViews`], held by the [`Catalog`].

mod catalog;
mod dispatch;
mod error;
mod model;
mod query;

pub use catalog::{Catalog, ModelViews};
pub use error::{ModelError, ModelResult};
pub use model::Model;
pub use query::{Lookup, ViewItem, ViewOutput, ViewQuery};
