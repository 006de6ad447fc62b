//! Typed builder for index function source.
//!
//! A synthesized map function is an ordered list of guard predicates, an
//! ordered list of required fields and an emit clause. It renders to the
//! JavaScript a CouchDB-style store executes. Source text supplied by the
//! caller is carried verbatim.

use crate::document::{Document, TYPE_FIELD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A predicate a document must satisfy before a synthesized map emits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// `doc['<field>'] == '<value>'`.
    FieldEquals { field: String, value: String },
    /// An arbitrary JavaScript boolean expression over `doc`.
    Expression(String),
}

impl Guard {
    /// Guard restricting a view to documents of one model type.
    pub fn type_is(type_name: &str) -> Self {
        Self::FieldEquals {
            field: TYPE_FIELD.to_string(),
            value: type_name.to_string(),
        }
    }

    /// Renders the guard as a parenthesized JavaScript expression.
    pub fn render(&self) -> String {
        match self {
            Self::FieldEquals { field, value } => {
                format!("({} == '{}')", field_ref(field), escape_js(value))
            }
            Self::Expression(expr) => format!("({expr})"),
        }
    }

    /// Evaluates the guard in-process. `None` when it can only run inside the store.
    pub fn matches(&self, doc: &Document) -> Option<bool> {
        match self {
            Self::FieldEquals { field, value } => Some(doc.get_str(field) == Some(value.as_str())),
            Self::Expression(_) => None,
        }
    }
}

/// The map half of a view.
#[derive(Debug, Clone)]
pub enum MapFunction {
    /// Generated from guards and an ordered key list.
    Synthesized { guards: Vec<Guard>, keys: Vec<String> },
    /// Caller supplied (or read back from a store) source text.
    Source(String),
}

impl MapFunction {
    pub fn synthesized(guards: Vec<Guard>, keys: Vec<String>) -> Self {
        Self::Synthesized { guards, keys }
    }

    pub fn source(source: impl Into<String>) -> Self {
        Self::Source(source.into())
    }

    /// Renders the function source.
    pub fn render(&self) -> String {
        match self {
            Self::Synthesized { guards, keys } => render_synthesized(guards, keys),
            Self::Source(source) => source.clone(),
        }
    }

    /// Whether [`MapFunction::evaluate`] can run this function in-process.
    pub fn is_native(&self) -> bool {
        match self {
            Self::Synthesized { guards, .. } => {
                guards.iter().all(|g| matches!(g, Guard::FieldEquals { .. }))
            }
            Self::Source(_) => false,
        }
    }

    /// Runs a native map function over one document, returning the emitted key.
    ///
    /// Returns `None` when the document is filtered out or the function is
    /// not native.
    pub fn evaluate(&self, doc: &Document) -> Option<Value> {
        let Self::Synthesized { guards, keys } = self else {
            return None;
        };
        if !guards.iter().all(|g| g.matches(doc) == Some(true)) {
            return None;
        }
        if !keys.iter().all(|k| doc.has(k)) {
            return None;
        }

        let mut values: Vec<Value> = keys.iter().filter_map(|k| doc.get(k).cloned()).collect();
        Some(match values.len() {
            0 => Value::Null,
            1 => values.remove(0),
            _ => Value::Array(values),
        })
    }
}

impl PartialEq for MapFunction {
    fn eq(&self, other: &Self) -> bool {
        self.render() == other.render()
    }
}

impl Serialize for MapFunction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.render())
    }
}

impl<'de> Deserialize<'de> for MapFunction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::Source)
    }
}

/// The reduce half of a view.
#[derive(Debug, Clone)]
pub enum ReduceFunction {
    /// Built-in `_count`.
    Count,
    /// Built-in `_sum`.
    Sum,
    /// Built-in `_stats`.
    Stats,
    /// Caller supplied source text.
    Source(String),
}

impl ReduceFunction {
    /// Parses reduce source, recognizing the built-in reducers.
    pub fn from_source(source: impl Into<String>) -> Self {
        let source = source.into();
        match source.trim() {
            "_count" => Self::Count,
            "_sum" => Self::Sum,
            "_stats" => Self::Stats,
            _ => Self::Source(source),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::Count => "_count".to_string(),
            Self::Sum => "_sum".to_string(),
            Self::Stats => "_stats".to_string(),
            Self::Source(source) => source.clone(),
        }
    }

    /// False for blank source text.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Source(source) if source.trim().is_empty())
    }
}

impl PartialEq for ReduceFunction {
    fn eq(&self, other: &Self) -> bool {
        self.render() == other.render()
    }
}

impl Serialize for ReduceFunction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.render())
    }
}

impl<'de> Deserialize<'de> for ReduceFunction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from_source)
    }
}

fn render_synthesized(guards: &[Guard], keys: &[String]) -> String {
    let doc_keys: Vec<String> = keys.iter().map(|k| field_ref(k)).collect();

    let mut conditions: Vec<String> = guards.iter().map(Guard::render).collect();
    conditions.extend(doc_keys.iter().map(|k| format!("({k} != null)")));

    let emitted = match doc_keys.as_slice() {
        [] => "null".to_string(),
        [single] => single.clone(),
        many => format!("[{}]", many.join(", ")),
    };

    if conditions.is_empty() {
        return format!("function(doc) {{\n  emit({emitted}, null);\n}}");
    }
    format!(
        "function(doc) {{\n  if ({}) {{\n    emit({emitted}, null);\n  }}\n}}",
        conditions.join(" && ")
    )
}

fn field_ref(field: &str) -> String {
    format!("doc['{}']", escape_js(field))
}

fn escape_js(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}
