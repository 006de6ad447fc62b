use crate::function::{Guard, MapFunction, ReduceFunction};
use crate::query::QueryParams;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Name of the view every model gets: all documents of the model keyed by `_id`.
pub const ALL_VIEW: &str = "all";

/// Canonical name of a view over `keys`: `by_a_and_b`.
pub fn view_name(keys: &[&str]) -> String {
    format!("by_{}", keys.join("_and_"))
}

/// Query defaults attached to a view at declaration time.
///
/// Caller-supplied query parameters always take precedence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descending: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<bool>,
}

impl ViewDefaults {
    /// Fills unset parameters from the defaults.
    pub fn apply(&self, params: &mut QueryParams) {
        if params.descending.is_none() {
            params.descending = self.descending;
        }
        if params.reduce.is_none() {
            params.reduce = self.reduce;
        }
    }
}

/// The persisted functions of one view: `{ "map": ..., "reduce": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewFunctions {
    pub map: MapFunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<ReduceFunction>,
}

impl ViewFunctions {
    /// True only with a non-empty reduce function.
    pub fn can_reduce(&self) -> bool {
        self.reduce.as_ref().is_some_and(|r| !r.is_empty())
    }
}

/// Declaration options for a view.
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    /// Explicit view name; otherwise derived from the keys.
    pub name: Option<String>,
    /// Custom map source. Disables the type guard.
    pub map: Option<String>,
    pub reduce: Option<ReduceFunction>,
    /// Extra guard expressions, applied after the type guard.
    pub guards: Vec<String>,
    /// Skip the type guard: the view matches any document with the keys.
    pub ducktype: bool,
    pub descending: Option<bool>,
    /// Reduce unless the query says otherwise. Off by default so plain
    /// queries on a reducible view still return documents.
    pub reduce_by_default: bool,
}

impl ViewOptions {
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn map(mut self, source: impl Into<String>) -> Self {
        self.map = Some(source.into());
        self
    }

    #[must_use]
    pub fn reduce(mut self, reduce: ReduceFunction) -> Self {
        self.reduce = Some(reduce);
        self
    }

    #[must_use]
    pub fn guard(mut self, expression: impl Into<String>) -> Self {
        self.guards.push(expression.into());
        self
    }

    #[must_use]
    pub const fn ducktype(mut self) -> Self {
        self.ducktype = true;
        self
    }

    #[must_use]
    pub const fn descending(mut self, descending: bool) -> Self {
        self.descending = Some(descending);
        self
    }

    #[must_use]
    pub const fn reduce_by_default(mut self) -> Self {
        self.reduce_by_default = true;
        self
    }
}

/// A named view declared by one model.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDefinition {
    pub name: String,
    /// Type name of the declaring model.
    pub model: String,
    pub functions: ViewFunctions,
    pub defaults: ViewDefaults,
}

impl ViewDefinition {
    /// Synthesizes a view for `model` over the ordered `keys`.
    ///
    /// Without a custom map the result is fully determined by the inputs:
    /// same model, keys and options always render the same source.
    pub fn synthesize(model: &str, keys: &[&str], options: ViewOptions) -> Result<Self> {
        let ViewOptions {
            name,
            map,
            reduce,
            guards,
            ducktype,
            descending,
            reduce_by_default,
        } = options;

        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ if keys.is_empty() => return Err(Error::EmptyKeys),
            _ => view_name(keys),
        };

        let map = match map {
            Some(source) => MapFunction::Source(source),
            None => {
                let mut all_guards = Vec::with_capacity(guards.len() + 1);
                if !ducktype {
                    all_guards.push(Guard::type_is(model));
                }
                all_guards.extend(guards.into_iter().map(Guard::Expression));
                MapFunction::synthesized(all_guards, keys.iter().map(|k| (*k).to_string()).collect())
            }
        };

        let reduce = reduce.filter(|r| !r.is_empty());
        let defaults = ViewDefaults {
            descending,
            reduce: reduce.as_ref().map(|_| reduce_by_default),
        };

        Ok(Self {
            name,
            model: model.to_string(),
            functions: ViewFunctions { map, reduce },
            defaults,
        })
    }

    /// The `all` view of a model.
    pub fn all(model: &str) -> Self {
        Self {
            name: ALL_VIEW.to_string(),
            model: model.to_string(),
            functions: ViewFunctions {
                map: MapFunction::synthesized(vec![Guard::type_is(model)], vec!["_id".to_string()]),
                reduce: None,
            },
            defaults: ViewDefaults::default(),
        }
    }

    pub fn can_reduce(&self) -> bool {
        self.functions.can_reduce()
    }
}
