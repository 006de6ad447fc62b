//! Store connections for couchview.
//!
//! The view layer never talks to a document store directly. It goes through
//! [`StoreConnection`], a narrow interface covering exactly what publishing
//! and querying views needs:
//! - read and write a design document
//! - query a view of a design document
//!
//! Two implementations ship here:
//! - [`CouchDbConnection`]: CouchDB's HTTP API over reqwest
//! - [`MemoryStore`]: an in-process store that evaluates synthesized views,
//!   for tests and embedding
//!
//! Errors are surfaced unchanged; nothing in this crate retries.

mod couchdb;
mod error;
mod memory;

pub use couchdb::{CouchDbConfig, CouchDbConnection};
pub use error::{StoreError, StoreResult};
pub use memory::{collate, MemoryStore};

use async_trait::async_trait;
use couchview_types::{DesignDocument, QueryParams, ViewResponse};

/// A connection to one database of a document store.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    /// Identifies the database. Used in logs, and publication state is
    /// tracked per name, so distinct databases need distinct names.
    fn name(&self) -> &str;

    /// Reads a design document. `Ok(None)` when it does not exist.
    async fn get_design_document(&self, id: &str) -> StoreResult<Option<DesignDocument>>;

    /// Writes a design document, returning its new revision.
    ///
    /// The document's `rev` must match the stored revision, or be `None`
    /// for a new document; otherwise the write fails with
    /// [`StoreError::Conflict`].
    async fn put_design_document(&self, doc: &DesignDocument) -> StoreResult<String>;

    /// Queries one view of a design document.
    ///
    /// Fails with [`StoreError::NotFound`] when the design document or the
    /// view is missing.
    async fn query_view(
        &self,
        design_id: &str,
        view: &str,
        params: &QueryParams,
    ) -> StoreResult<ViewResponse>;
}
