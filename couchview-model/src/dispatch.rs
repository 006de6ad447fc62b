//! Runs a named view for a model and shapes the response.
//!
//! Output shape is decided by the request alone:
//! - `reduce` requested: raw output, the reduced value unless grouped
//! - `raw`, or `include_docs` explicitly false: the store rows
//! - otherwise: documents are included in the one query and each non-null
//!   document is materialized in row order

use crate::catalog::ModelViews;
use crate::error::{ModelError, ModelResult};
use crate::query::{Lookup, ViewItem, ViewOutput, ViewQuery};
use couchview_types::{Document, QueryParams, ViewResponse};
use serde_json::Value;
use tracing::debug;

/// Response shape chosen for one call.
enum Fetched {
    Rows(ViewResponse),
    Reduced(Value),
    Documents(ViewResponse),
}

async fn fetch(views: &ModelViews, name: &str, query: &ViewQuery) -> ModelResult<Fetched> {
    let conn = query
        .database
        .clone()
        .or_else(|| views.database())
        .ok_or_else(|| ModelError::NoDatabase {
            model: views.model().to_string(),
        })?;

    let definition = views
        .design()
        .definition(views.model(), name)
        .ok_or_else(|| ModelError::NotFound {
            model: views.model().to_string(),
            name: name.to_string(),
        })?;

    let mut params: QueryParams = query.params.clone();
    definition.defaults.apply(&mut params);

    let reducing = params.reduce == Some(true);
    if reducing && !definition.can_reduce() {
        return Err(ModelError::CannotReduce {
            name: name.to_string(),
        });
    }

    let hydrate = !(reducing || query.raw || params.include_docs == Some(false));
    if reducing {
        // Reduced rows have no document to include.
        params.include_docs = None;
    } else if hydrate {
        params.include_docs = Some(true);
    }

    debug!(
        "{}.{} on {} (reduce: {}, hydrate: {})",
        views.model(),
        name,
        conn.name(),
        reducing,
        hydrate
    );
    let response = views
        .design()
        .query(conn.as_ref(), views.model(), name, &params)
        .await?;

    Ok(if reducing && params.group != Some(true) {
        Fetched::Reduced(response.reduced_value())
    } else if hydrate {
        Fetched::Documents(response)
    } else {
        Fetched::Rows(response)
    })
}

/// Rows carrying a non-null document, in row order.
fn documents(response: ViewResponse) -> impl Iterator<Item = Document> {
    response
        .rows
        .into_iter()
        .filter_map(|row| row.doc.filter(|doc| !doc.is_null()).map(Document::new))
}

pub(crate) async fn view<M, F>(
    views: &ModelViews,
    name: &str,
    query: &ViewQuery,
    materialize: F,
) -> ModelResult<ViewOutput<M>>
where
    F: Fn(Document) -> ModelResult<M>,
{
    Ok(match fetch(views, name, query).await? {
        Fetched::Rows(response) => ViewOutput::Rows(response),
        Fetched::Reduced(value) => ViewOutput::Reduced(value),
        Fetched::Documents(response) => ViewOutput::Models(
            documents(response)
                .map(materialize)
                .collect::<ModelResult<Vec<M>>>()?,
        ),
    })
}

/// Like [`view`], handing each item to `consumer` instead of collecting.
/// Returns the number of items delivered.
pub(crate) async fn view_with<M, F, C>(
    views: &ModelViews,
    name: &str,
    query: &ViewQuery,
    materialize: F,
    mut consumer: C,
) -> ModelResult<usize>
where
    F: Fn(Document) -> ModelResult<M>,
    C: FnMut(ViewItem<M>),
{
    let mut delivered = 0;
    match fetch(views, name, query).await? {
        Fetched::Rows(response) => {
            for row in response.rows {
                consumer(ViewItem::Row(row));
                delivered += 1;
            }
        }
        Fetched::Reduced(Value::Null) => {}
        Fetched::Reduced(value) => {
            consumer(ViewItem::Reduced(value));
            delivered += 1;
        }
        Fetched::Documents(response) => {
            for doc in documents(response) {
                consumer(ViewItem::Model(materialize(doc)?));
                delivered += 1;
            }
        }
    }
    Ok(delivered)
}

/// Builds the `limit = 1` query behind `first_from_view`.
///
/// A key lookup is an exact match over `extra`, replacing any key `extra`
/// carries; a query lookup is used as given, keeping its own limit if it
/// sets one.
pub(crate) fn first_query(lookup: Lookup, extra: Option<&ViewQuery>) -> ViewQuery {
    let mut query = ViewQuery::new().limit(1);
    match lookup {
        Lookup::Key(key) => {
            if let Some(extra) = extra {
                if let Some(replaced) = &extra.params.key {
                    debug!("Lookup key {} replaces key {} of the extra query", key, replaced);
                }
                query.params.merge(&extra.params);
                query.raw = extra.raw;
                query.database.clone_from(&extra.database);
            }
            query.params.key = Some(key);
        }
        Lookup::Query(given) => {
            query.params.merge(&given.params);
            query.raw = given.raw;
            query.database = given.database;
        }
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_lookup_is_exact_match_with_limit() {
        let query = first_query(Lookup::from("Fred"), None);
        assert_eq!(query.params.key, Some(json!("Fred")));
        assert_eq!(query.params.limit, Some(1));
        assert!(!query.raw);
    }

    #[test]
    fn key_lookup_merges_extra() {
        let extra = ViewQuery::new().descending(true).limit(5).raw();
        let query = first_query(Lookup::from(json!(["a", 1])), Some(&extra));
        assert_eq!(query.params.key, Some(json!(["a", 1])));
        assert_eq!(query.params.descending, Some(true));
        assert_eq!(query.params.limit, Some(5));
        assert!(query.raw);
    }

    #[test]
    fn lookup_key_wins_over_extra_key() {
        let extra = ViewQuery::new().key("Barney").startkey("A");
        let query = first_query(Lookup::from("Fred"), Some(&extra));
        assert_eq!(query.params.key, Some(json!("Fred")));
        assert_eq!(query.params.startkey, Some(json!("A")));
        assert_eq!(extra.params.key, Some(json!("Barney")));
    }

    #[test]
    fn query_lookup_keeps_its_params() {
        let given = ViewQuery::new().startkey("b").endkey("c");
        let query = first_query(Lookup::from(given), None);
        assert_eq!(query.params.startkey, Some(json!("b")));
        assert_eq!(query.params.endkey, Some(json!("c")));
        assert_eq!(query.params.limit, Some(1));
        assert_eq!(query.params.key, None);
    }
}
