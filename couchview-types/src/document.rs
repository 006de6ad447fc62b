use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding the declaring model's type name on every stored document.
pub const TYPE_FIELD: &str = "couchrest-type";

/// A raw document as stored in (or returned by) the document store.
///
/// Only the top-level fields this layer touches get accessors; everything
/// else is left to the model's materializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Value);

impl Document {
    /// Wraps an arbitrary JSON value.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Builds a document for `type_name` with the given id, merging `fields`
    /// when it is an object.
    #[must_use]
    pub fn typed(type_name: &str, id: &str, fields: Value) -> Self {
        let mut object = match fields {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        object.insert("_id".to_string(), Value::String(id.to_string()));
        object.insert(TYPE_FIELD.to_string(), Value::String(type_name.to_string()));
        Self(Value::Object(object))
    }

    /// The document `_id`, if present.
    pub fn id(&self) -> Option<&str> {
        self.get_str("_id")
    }

    /// The document revision, if present.
    pub fn rev(&self) -> Option<&str> {
        self.get_str("_rev")
    }

    /// The stored type discriminator.
    pub fn type_name(&self) -> Option<&str> {
        self.get_str(TYPE_FIELD)
    }

    /// A top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// A top-level string field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Whether a top-level field is present and not null.
    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some_and(|v| !v.is_null())
    }

    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
