//! The persisted design document.

use crate::view::ViewFunctions;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Id prefix of every design document.
pub const DESIGN_PREFIX: &str = "_design/";

/// Language tag written on every design document.
pub const VIEW_LANGUAGE: &str = "javascript";

/// Design document id for a namespace: `_design/<namespace>`.
pub fn design_id(namespace: &str) -> String {
    if namespace.starts_with(DESIGN_PREFIX) {
        namespace.to_string()
    } else {
        format!("{DESIGN_PREFIX}{namespace}")
    }
}

/// A design document: the store-visible container of view functions.
///
/// Fields other than `_id`, `_rev`, `language` and `views` (filters,
/// validation functions written by other tools) are preserved in `extra`
/// so a rewrite never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub views: BTreeMap<String, ViewFunctions>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_language() -> String {
    VIEW_LANGUAGE.to_string()
}

impl DesignDocument {
    /// Creates an empty design document for a namespace.
    pub fn new(namespace: &str) -> Self {
        Self {
            id: design_id(namespace),
            rev: None,
            language: default_language(),
            views: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    /// The namespace part of the id.
    pub fn namespace(&self) -> &str {
        self.id.strip_prefix(DESIGN_PREFIX).unwrap_or(&self.id)
    }

    /// Names of views in `self` that `other` lacks or holds with different functions.
    pub fn differing_views(&self, other: &Self) -> Vec<String> {
        self.views
            .iter()
            .filter(|(name, functions)| other.views.get(*name) != Some(*functions))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Copies every view of `local` over this document, keeping views only this one has.
    pub fn merge_views(&mut self, local: &Self) {
        for (name, functions) in &local.views {
            self.views.insert(name.clone(), functions.clone());
        }
        self.language = local.language.clone();
    }
}
