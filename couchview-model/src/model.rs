use crate::catalog::{Catalog, ModelViews};
use crate::dispatch;
use crate::error::ModelResult;
use crate::query::{Lookup, ViewItem, ViewOutput, ViewQuery};
use couchview_store::StoreConnection;
use couchview_types::{Document, ViewOptions, ALL_VIEW};
use std::sync::Arc;

/// A model type stored as typed documents.
///
/// Implementors supply the type name written to every document and the
/// materializer that turns a stored document back into an instance. Every
/// other method has a default that goes through the model's [`ModelViews`]
/// in the global [`Catalog`].
///
/// Views are declared once, typically at startup:
///
/// ```text
/// Post::declare_view(&["date"], ViewOptions::default())?;
/// Post::use_database(Arc::new(CouchDbConnection::new(config)?));
///
/// let posts = Post::view("by_date", &ViewQuery::new()).await?.into_models();
/// ```
#[allow(async_fn_in_trait)]
pub trait Model: Sized + Send + 'static {
    /// Value of the type field on this model's documents.
    fn type_name() -> &'static str;

    /// Materializes a stored document.
    fn from_document(doc: Document) -> ModelResult<Self>;

    fn views() -> Arc<ModelViews> {
        Catalog::global().model::<Self>()
    }

    /// Sets the default database for this model's queries.
    fn use_database(database: Arc<dyn StoreConnection>) {
        Self::views().use_database(database);
    }

    /// Declares a view over `keys` and returns its name.
    fn declare_view(keys: &[&str], options: ViewOptions) -> ModelResult<String> {
        Self::views().declare(keys, options)
    }

    fn has_view(name: &str) -> bool {
        Self::views().has_view(name)
    }

    fn can_reduce_view(name: &str) -> bool {
        Self::views().can_reduce_view(name)
    }

    async fn view(name: &str, query: &ViewQuery) -> ModelResult<ViewOutput<Self>> {
        dispatch::view(&Self::views(), name, query, Self::from_document).await
    }

    /// Streams the result of [`Model::view`] into `consumer`.
    async fn view_with<C>(name: &str, query: &ViewQuery, consumer: C) -> ModelResult<usize>
    where
        C: FnMut(ViewItem<Self>),
    {
        dispatch::view_with(&Self::views(), name, query, Self::from_document, consumer).await
    }

    /// First item of a `limit = 1` query, or `None` when nothing matches.
    ///
    /// A key lookup is merged over `extra` and replaces any key set there.
    async fn first_from_view(
        name: &str,
        lookup: impl Into<Lookup>,
        extra: Option<&ViewQuery>,
    ) -> ModelResult<Option<ViewItem<Self>>> {
        let query = dispatch::first_query(lookup.into(), extra);
        Ok(Self::view(name, &query).await?.first())
    }

    /// Every document of this model, ordered by id.
    async fn all(query: &ViewQuery) -> ModelResult<ViewOutput<Self>> {
        Self::view(ALL_VIEW, query).await
    }
}
