//! View query parameters and responses.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How stale an index may be when queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stale {
    Ok,
    UpdateAfter,
}

impl Stale {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::UpdateAfter => "update_after",
        }
    }
}

/// Options passed through unchanged to the store's view endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startkey: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endkey: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descending: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_docs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale: Option<Stale>,
}

impl QueryParams {
    /// Overlays every parameter set in `other`.
    pub fn merge(&mut self, other: &Self) {
        fn pick<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        pick(&mut self.key, &other.key);
        pick(&mut self.startkey, &other.startkey);
        pick(&mut self.endkey, &other.endkey);
        pick(&mut self.limit, &other.limit);
        pick(&mut self.skip, &other.skip);
        pick(&mut self.descending, &other.descending);
        pick(&mut self.reduce, &other.reduce);
        pick(&mut self.include_docs, &other.include_docs);
        pick(&mut self.group, &other.group);
        pick(&mut self.stale, &other.stale);
    }

    /// Encodes the parameters as URL query pairs. Keys are JSON encoded.
    pub fn to_query_pairs(&self) -> crate::Result<Vec<(&'static str, String)>> {
        let mut pairs = Vec::new();
        for (name, value) in [
            ("key", &self.key),
            ("startkey", &self.startkey),
            ("endkey", &self.endkey),
        ] {
            if let Some(value) = value {
                pairs.push((name, serde_json::to_string(value)?));
            }
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(skip) = self.skip {
            pairs.push(("skip", skip.to_string()));
        }
        for (name, flag) in [
            ("descending", self.descending),
            ("reduce", self.reduce),
            ("include_docs", self.include_docs),
            ("group", self.group),
        ] {
            if let Some(flag) = flag {
                pairs.push((name, flag.to_string()));
            }
        }
        if let Some(stale) = self.stale {
            pairs.push(("stale", stale.as_str().to_string()));
        }
        Ok(pairs)
    }
}

/// One row of a view response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    /// Source document id. Absent on reduced rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
}

impl ViewRow {
    /// The included document, unless it is missing or null.
    pub fn document(&self) -> Option<Document> {
        self.doc
            .as_ref()
            .filter(|doc| !doc.is_null())
            .map(|doc| Document::new(doc.clone()))
    }
}

/// A view response as returned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default)]
    pub rows: Vec<ViewRow>,
}

impl ViewResponse {
    /// The value of the first row: the result of an ungrouped reduce.
    pub fn reduced_value(&self) -> Value {
        self.rows.first().map(|row| row.value.clone()).unwrap_or(Value::Null)
    }
}
