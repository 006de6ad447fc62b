//! In-process document store.
//!
//! Holds documents and design documents in memory and runs views whose map
//! function is native (see [`MapFunction::is_native`]). Rows are ordered by
//! CouchDB view collation, then by document id. Built-in reducers run in
//! process; source-text functions are rejected as unsupported.

use crate::error::{StoreError, StoreResult};
use crate::StoreConnection;
use async_trait::async_trait;
use couchview_types::{
    DesignDocument, Document, MapFunction, QueryParams, ReduceFunction, ViewResponse, ViewRow,
};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// An in-memory store.
pub struct MemoryStore {
    name: String,
    documents: RwLock<BTreeMap<String, Document>>,
    designs: RwLock<HashMap<String, DesignDocument>>,
    design_writes: AtomicUsize,
    view_queries: AtomicUsize,
    write_delay: Option<Duration>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(BTreeMap::new()),
            designs: RwLock::new(HashMap::new()),
            design_writes: AtomicUsize::new(0),
            view_queries: AtomicUsize::new(0),
            write_delay: None,
        }
    }

    /// Delays every design document write, widening race windows in tests.
    #[must_use]
    pub const fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Inserts or replaces a document. It must carry a string `_id`.
    pub fn insert(&self, doc: Document) -> StoreResult<()> {
        let id = doc
            .id()
            .ok_or_else(|| StoreError::InvalidDocument("document has no _id".to_string()))?
            .to_string();
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, doc);
        Ok(())
    }

    /// Removes a document, returning whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Current copy of a design document.
    pub fn design_document(&self, id: &str) -> Option<DesignDocument> {
        self.designs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Drops a design document, as if it had been deleted out of band.
    pub fn remove_design_document(&self, id: &str) -> bool {
        self.designs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Number of successful design document writes.
    pub fn design_writes(&self) -> usize {
        self.design_writes.load(AtomicOrdering::SeqCst)
    }

    /// Number of view queries received.
    pub fn view_queries(&self) -> usize {
        self.view_queries.load(AtomicOrdering::SeqCst)
    }

    /// Runs the map function over every document, in collation order.
    fn map_rows(&self, map: &MapFunction) -> Vec<(Value, Document)> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows: Vec<(Value, Document)> = documents
            .values()
            .filter_map(|doc| map.evaluate(doc).map(|key| (key, doc.clone())))
            .collect();
        rows.sort_by(|(ka, da), (kb, db)| collate(ka, kb).then_with(|| da.id().cmp(&db.id())));
        rows
    }
}

#[async_trait]
impl StoreConnection for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_design_document(&self, id: &str) -> StoreResult<Option<DesignDocument>> {
        Ok(self.design_document(id))
    }

    async fn put_design_document(&self, doc: &DesignDocument) -> StoreResult<String> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }

        let mut designs = self.designs.write().unwrap_or_else(PoisonError::into_inner);
        let current = designs.get(&doc.id).and_then(|d| d.rev.clone());
        if current != doc.rev {
            return Err(StoreError::Conflict(doc.id.clone()));
        }

        let generation = current
            .as_deref()
            .and_then(|rev| rev.split('-').next())
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0);
        let rev = format!("{}-memory", generation + 1);

        let mut stored = doc.clone();
        stored.rev = Some(rev.clone());
        designs.insert(doc.id.clone(), stored);
        self.design_writes.fetch_add(1, AtomicOrdering::SeqCst);

        debug!("Stored design document {} (rev {}) in {}", doc.id, rev, self.name);
        Ok(rev)
    }

    async fn query_view(
        &self,
        design_id: &str,
        view: &str,
        params: &QueryParams,
    ) -> StoreResult<ViewResponse> {
        self.view_queries.fetch_add(1, AtomicOrdering::SeqCst);

        let functions = self
            .design_document(design_id)
            .and_then(|design| design.views.get(view).cloned())
            .ok_or_else(|| StoreError::NotFound(format!("{design_id}/_view/{view}")))?;

        if !functions.map.is_native() {
            return Err(StoreError::Unsupported(format!(
                "map function of {view} cannot run in memory"
            )));
        }

        let reduce = params.reduce.unwrap_or_else(|| functions.can_reduce());
        if reduce && !functions.can_reduce() {
            return Err(StoreError::Http {
                status: 400,
                body: format!("reduce is invalid for map-only view {view}"),
            });
        }
        if reduce && params.include_docs == Some(true) {
            return Err(StoreError::Http {
                status: 400,
                body: "include_docs is invalid for reduce".to_string(),
            });
        }

        let rows = select(self.map_rows(&functions.map), params);

        if reduce {
            let reducer = functions.reduce.as_ref().ok_or_else(|| {
                StoreError::Unsupported(format!("{view} has no reduce function"))
            })?;
            let reduced = reduce_rows(reducer, &rows, params.group.unwrap_or(false))?;
            return Ok(ViewResponse {
                total_rows: None,
                offset: None,
                rows: paginate(reduced, params),
            });
        }

        let total_rows = rows.len() as u64;
        let include_docs = params.include_docs.unwrap_or(false);
        let rows = rows
            .into_iter()
            .map(|(key, doc)| ViewRow {
                id: doc.id().map(str::to_string),
                key,
                value: Value::Null,
                doc: include_docs.then(|| doc.into_value()),
            })
            .collect();

        Ok(ViewResponse {
            total_rows: Some(total_rows),
            offset: Some(params.skip.unwrap_or(0)),
            rows: paginate(rows, params),
        })
    }
}

/// Orders and filters mapped rows by `descending`, `key`, `startkey` and `endkey`.
fn select(mut rows: Vec<(Value, Document)>, params: &QueryParams) -> Vec<(Value, Document)> {
    let descending = params.descending.unwrap_or(false);
    if descending {
        rows.reverse();
    }

    rows.retain(|(key, _)| {
        if let Some(exact) = &params.key {
            if collate(key, exact) != Ordering::Equal {
                return false;
            }
        }
        // With descending the range runs from startkey down to endkey.
        let (low, high) = if descending {
            (&params.endkey, &params.startkey)
        } else {
            (&params.startkey, &params.endkey)
        };
        low.as_ref().is_none_or(|low| collate(key, low) != Ordering::Less)
            && high.as_ref().is_none_or(|high| collate(key, high) != Ordering::Greater)
    });
    rows
}

fn paginate(rows: Vec<ViewRow>, params: &QueryParams) -> Vec<ViewRow> {
    let skip = usize::try_from(params.skip.unwrap_or(0)).unwrap_or(usize::MAX);
    let limit = params
        .limit
        .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    rows.into_iter().skip(skip).take(limit).collect()
}

fn reduce_rows(
    reducer: &ReduceFunction,
    rows: &[(Value, Document)],
    group: bool,
) -> StoreResult<Vec<ViewRow>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    if !group {
        // Synthesized maps always emit a null value.
        let values = vec![Value::Null; rows.len()];
        return Ok(vec![ViewRow {
            id: None,
            key: Value::Null,
            value: apply_reducer(reducer, &values)?,
            doc: None,
        }]);
    }

    let mut reduced = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let key = &rows[start].0;
        let end = rows[start..]
            .iter()
            .position(|(k, _)| collate(k, key) != Ordering::Equal)
            .map_or(rows.len(), |offset| start + offset);
        let values = vec![Value::Null; end - start];
        reduced.push(ViewRow {
            id: None,
            key: key.clone(),
            value: apply_reducer(reducer, &values)?,
            doc: None,
        });
        start = end;
    }
    Ok(reduced)
}

fn apply_reducer(reducer: &ReduceFunction, values: &[Value]) -> StoreResult<Value> {
    match reducer {
        ReduceFunction::Count => Ok(json!(values.len())),
        ReduceFunction::Sum => Ok(json!(numbers(values)?.iter().sum::<f64>())),
        ReduceFunction::Stats => {
            let numbers = numbers(values)?;
            let sum: f64 = numbers.iter().sum();
            let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
            let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let sumsqr: f64 = numbers.iter().map(|n| n * n).sum();
            Ok(json!({
                "sum": sum,
                "count": numbers.len(),
                "min": min,
                "max": max,
                "sumsqr": sumsqr,
            }))
        }
        ReduceFunction::Source(_) => Err(StoreError::Unsupported(
            "reduce source cannot run in memory".to_string(),
        )),
    }
}

fn numbers(values: &[Value]) -> StoreResult<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| StoreError::Http {
                status: 500,
                body: "builtin reducer requires map values to be numbers".to_string(),
            })
        })
        .collect()
}

/// Compares two view keys by CouchDB collation:
/// null < false < true < numbers < strings < arrays < objects.
///
/// Strings compare by code point rather than ICU collation.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(false) => 1,
            Value::Bool(true) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(x, y)| collate(x, y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y.iter())
            .map(|((kx, vx), (ky, vy))| kx.cmp(ky).then_with(|| collate(vx, vy)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}
