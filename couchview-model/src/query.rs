//! Per-call query requests and their results.

use couchview_store::StoreConnection;
use couchview_types::{QueryParams, Stale, ViewResponse, ViewRow};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A view query built per call.
///
/// `params` pass through to the store. `raw` skips materialization, and
/// `database` overrides the model's default connection for this call.
#[derive(Clone, Default)]
pub struct ViewQuery {
    pub params: QueryParams,
    pub raw: bool,
    pub database: Option<Arc<dyn StoreConnection>>,
}

impl fmt::Debug for ViewQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewQuery")
            .field("params", &self.params)
            .field("raw", &self.raw)
            .field("database", &self.database.as_ref().map(|db| db.name()))
            .finish()
    }
}

impl ViewQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-match key; scalar or array.
    #[must_use]
    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.params.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn startkey(mut self, key: impl Into<Value>) -> Self {
        self.params.startkey = Some(key.into());
        self
    }

    #[must_use]
    pub fn endkey(mut self, key: impl Into<Value>) -> Self {
        self.params.endkey = Some(key.into());
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.params.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn skip(mut self, skip: u64) -> Self {
        self.params.skip = Some(skip);
        self
    }

    #[must_use]
    pub const fn descending(mut self, descending: bool) -> Self {
        self.params.descending = Some(descending);
        self
    }

    /// Requests the reduced value. Implies raw output.
    #[must_use]
    pub const fn reduce(mut self, reduce: bool) -> Self {
        self.params.reduce = Some(reduce);
        self
    }

    /// `false` returns the store rows without materializing them.
    #[must_use]
    pub const fn include_docs(mut self, include_docs: bool) -> Self {
        self.params.include_docs = Some(include_docs);
        self
    }

    #[must_use]
    pub const fn group(mut self, group: bool) -> Self {
        self.params.group = Some(group);
        self
    }

    #[must_use]
    pub const fn stale(mut self, stale: Stale) -> Self {
        self.params.stale = Some(stale);
        self
    }

    /// Returns store rows as-is.
    #[must_use]
    pub const fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    #[must_use]
    pub fn database(mut self, database: Arc<dyn StoreConnection>) -> Self {
        self.database = Some(database);
        self
    }
}

/// What `first_from_view` looks up: a key, or a full query.
#[derive(Debug, Clone)]
pub enum Lookup {
    Key(Value),
    Query(ViewQuery),
}

impl From<Value> for Lookup {
    fn from(key: Value) -> Self {
        Self::Key(key)
    }
}

impl From<&str> for Lookup {
    fn from(key: &str) -> Self {
        Self::Key(Value::from(key))
    }
}

impl From<String> for Lookup {
    fn from(key: String) -> Self {
        Self::Key(Value::from(key))
    }
}

impl From<i64> for Lookup {
    fn from(key: i64) -> Self {
        Self::Key(Value::from(key))
    }
}

impl From<ViewQuery> for Lookup {
    fn from(query: ViewQuery) -> Self {
        Self::Query(query)
    }
}

/// Result of a view call. Exactly one shape per call.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewOutput<M> {
    /// Store rows, unmaterialized.
    Rows(ViewResponse),
    /// Value of an ungrouped reduce; null when no rows matched.
    Reduced(Value),
    /// Materialized instances in row order.
    Models(Vec<M>),
}

impl<M> ViewOutput<M> {
    /// Number of items a consumer would receive.
    pub fn len(&self) -> usize {
        match self {
            Self::Rows(response) => response.rows.len(),
            Self::Reduced(value) => usize::from(!value.is_null()),
            Self::Models(models) => models.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(self) -> Option<ViewItem<M>> {
        self.into_iter().next()
    }

    /// The materialized instances; empty for raw and reduced output.
    pub fn into_models(self) -> Vec<M> {
        match self {
            Self::Models(models) => models,
            Self::Rows(_) | Self::Reduced(_) => Vec::new(),
        }
    }

    pub fn into_rows(self) -> Option<ViewResponse> {
        match self {
            Self::Rows(response) => Some(response),
            Self::Reduced(_) | Self::Models(_) => None,
        }
    }

    pub fn into_reduced(self) -> Option<Value> {
        match self {
            Self::Reduced(value) => Some(value),
            Self::Rows(_) | Self::Models(_) => None,
        }
    }
}

impl<M> IntoIterator for ViewOutput<M> {
    type Item = ViewItem<M>;
    type IntoIter = std::vec::IntoIter<ViewItem<M>>;

    fn into_iter(self) -> Self::IntoIter {
        let items: Vec<ViewItem<M>> = match self {
            Self::Rows(response) => response.rows.into_iter().map(ViewItem::Row).collect(),
            Self::Reduced(Value::Null) => Vec::new(),
            Self::Reduced(value) => vec![ViewItem::Reduced(value)],
            Self::Models(models) => models.into_iter().map(ViewItem::Model).collect(),
        };
        items.into_iter()
    }
}

/// One element of a view result, as delivered to a streaming consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewItem<M> {
    Model(M),
    Row(ViewRow),
    Reduced(Value),
}

impl<M> ViewItem<M> {
    pub fn into_model(self) -> Option<M> {
        match self {
            Self::Model(model) => Some(model),
            Self::Row(_) | Self::Reduced(_) => None,
        }
    }

    pub fn into_row(self) -> Option<ViewRow> {
        match self {
            Self::Row(row) => Some(row),
            Self::Model(_) | Self::Reduced(_) => None,
        }
    }
}
