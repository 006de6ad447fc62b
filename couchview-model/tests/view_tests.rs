use couchview_design::DesignRegistry;
use couchview_model::{
    Catalog, Lookup, Model, ModelError, ModelResult, ModelViews, ViewItem, ViewOutput, ViewQuery,
};
use couchview_store::MemoryStore;
use couchview_types::{Document, QueryParams, ReduceFunction, ViewOptions};
use pretty_assertions::assert_eq;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

fn materialize<T: DeserializeOwned>(doc: Document) -> ModelResult<T> {
    serde_json::from_value(doc.into_value()).map_err(ModelError::materialize)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Post {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    date: String,
}

impl Model for Post {
    fn type_name() -> &'static str {
        "Post"
    }

    fn from_document(doc: Document) -> ModelResult<Self> {
        materialize(doc)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Comment {
    #[serde(rename = "_id")]
    id: String,
    teacher: String,
    date: String,
}

impl Model for Comment {
    fn type_name() -> &'static str {
        "Comment"
    }

    fn from_document(doc: Document) -> ModelResult<Self> {
        materialize(doc)
    }
}

/// Declarations shared by every test using `Post` and `Comment`.
fn declare() {
    Post::declare_view(&["date"], ViewOptions::default()).unwrap();
    Post::declare_view(&["title"], ViewOptions::default().descending(true)).unwrap();
    Post::declare_view(&["author"], ViewOptions::default().reduce(ReduceFunction::Count)).unwrap();
    Post::declare_view(
        &["author"],
        ViewOptions::default()
            .named("count_by_author")
            .reduce(ReduceFunction::Count)
            .reduce_by_default(),
    )
    .unwrap();
    Comment::declare_view(&["date"], ViewOptions::default()).unwrap();
    Comment::declare_view(&["teacher"], ViewOptions::default()).unwrap();
}

/// Three posts dated D1 < D2 < D3, inserted out of order, and one comment dated D2.
fn blog_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new("blog");
    let docs = [
        Document::typed(
            "Post",
            "p-c",
            json!({"title": "Third", "date": "2009-03-01", "author": "ann"}),
        ),
        Document::typed(
            "Comment",
            "c-1",
            json!({"teacher": "Fred", "date": "2009-02-01"}),
        ),
        Document::typed(
            "Post",
            "p-b",
            json!({"title": "First", "date": "2009-01-01", "author": "ann"}),
        ),
        Document::typed(
            "Post",
            "p-a",
            json!({"title": "Second", "date": "2009-02-01", "author": "bob"}),
        ),
    ];
    for doc in docs {
        store.insert(doc).unwrap();
    }
    Arc::new(store)
}

fn on(store: &Arc<MemoryStore>) -> ViewQuery {
    ViewQuery::new().database(store.clone())
}

fn titles(posts: Vec<Post>) -> Vec<String> {
    posts.into_iter().map(|p| p.title).collect()
}

// ── Hydrated output ─────────────────────────────────────────────

#[tokio::test]
async fn view_returns_only_declaring_model_in_key_order() {
    declare();
    let store = blog_store();

    let posts = Post::view("by_date", &on(&store)).await.unwrap().into_models();
    assert_eq!(titles(posts), vec!["First", "Second", "Third"]);

    let comments = Comment::view("by_date", &on(&store)).await.unwrap().into_models();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].id, "c-1");
    assert_eq!(comments[0].date, "2009-02-01");
}

#[tokio::test]
async fn all_lists_model_by_id() {
    declare();
    let store = blog_store();

    let posts = Post::all(&on(&store)).await.unwrap().into_models();
    let ids: Vec<String> = posts.into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["p-a", "p-b", "p-c"]);
}

#[tokio::test]
async fn caller_query_is_left_untouched() {
    declare();
    let store = blog_store();
    let query = on(&store).startkey("2009-02-01");

    let posts = Post::view("by_date", &query).await.unwrap().into_models();
    assert_eq!(titles(posts), vec!["Second", "Third"]);
    assert_eq!(
        query.params,
        QueryParams {
            startkey: Some(json!("2009-02-01")),
            ..Default::default()
        }
    );
    assert!(!query.raw);
}

#[tokio::test]
async fn declared_descending_is_a_default_only() {
    declare();
    let store = blog_store();

    let posts = Post::view("by_title", &on(&store)).await.unwrap().into_models();
    assert_eq!(titles(posts), vec!["Third", "Second", "First"]);

    let posts = Post::view("by_title", &on(&store).descending(false))
        .await
        .unwrap()
        .into_models();
    assert_eq!(titles(posts), vec!["First", "Second", "Third"]);
}

#[tokio::test]
async fn materializer_errors_propagate() {
    declare();
    let store = blog_store();
    store
        .insert(Document::typed("Post", "p-bad", json!({"date": "2009-04-01"})))
        .unwrap();

    let err = Post::view("by_date", &on(&store)).await.unwrap_err();
    assert!(matches!(err, ModelError::Materialize(_)));
}

// ── Raw output ──────────────────────────────────────────────────

#[tokio::test]
async fn raw_returns_store_rows() {
    declare();
    let store = blog_store();

    let output = Post::view("by_date", &on(&store).raw()).await.unwrap();
    let response = output.into_rows().unwrap();
    let ids: Vec<_> = response.rows.iter().filter_map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec!["p-b", "p-a", "p-c"]);
    assert!(response.rows.iter().all(|r| r.doc.is_none()));
    assert_eq!(response.rows[0].key, json!("2009-01-01"));
}

#[tokio::test]
async fn include_docs_false_returns_rows() {
    declare();
    let store = blog_store();

    let output = Post::view("by_date", &on(&store).include_docs(false)).await.unwrap();
    assert!(matches!(output, ViewOutput::Rows(ref r) if r.rows.len() == 3));
}

// ── Reduce ──────────────────────────────────────────────────────

#[tokio::test]
async fn reducible_view_hydrates_unless_reduce_requested() {
    declare();
    let store = blog_store();
    assert!(Post::can_reduce_view("by_author"));

    let posts = Post::view("by_author", &on(&store)).await.unwrap().into_models();
    assert_eq!(titles(posts), vec!["First", "Third", "Second"]);

    let output = Post::view("by_author", &on(&store).reduce(true)).await.unwrap();
    assert_eq!(output, ViewOutput::Reduced(json!(3)));
}

#[tokio::test]
async fn reduce_wins_over_include_docs() {
    declare();
    let store = blog_store();

    let output = Post::view("by_author", &on(&store).reduce(true).include_docs(true))
        .await
        .unwrap();
    assert_eq!(output.into_reduced(), Some(json!(3)));
}

#[tokio::test]
async fn grouped_reduce_returns_rows() {
    declare();
    let store = blog_store();

    let response = Post::view("by_author", &on(&store).reduce(true).group(true))
        .await
        .unwrap()
        .into_rows()
        .unwrap();
    let groups: Vec<_> = response
        .rows
        .iter()
        .map(|r| (r.key.clone(), r.value.clone()))
        .collect();
    assert_eq!(
        groups,
        vec![(json!("ann"), json!(2)), (json!("bob"), json!(1))]
    );
}

#[tokio::test]
async fn reduce_by_default_view_reduces() {
    declare();
    let store = blog_store();

    let output = Post::view("count_by_author", &on(&store)).await.unwrap();
    assert_eq!(output, ViewOutput::Reduced(json!(3)));

    let posts = Post::view("count_by_author", &on(&store).reduce(false))
        .await
        .unwrap()
        .into_models();
    assert_eq!(posts.len(), 3);
}

#[tokio::test]
async fn reduce_on_map_only_view_fails_before_the_store() {
    declare();
    let store = blog_store();
    assert!(!Post::can_reduce_view("by_date"));

    let err = Post::view("by_date", &on(&store).reduce(true)).await.unwrap_err();
    assert!(matches!(err, ModelError::CannotReduce { ref name } if name == "by_date"));
    assert_eq!(store.view_queries(), 0);
    assert_eq!(store.design_writes(), 0);
}

#[tokio::test]
async fn empty_reduce_is_null() {
    declare();
    let store = Arc::new(MemoryStore::new("empty"));

    let output = Post::view("by_author", &on(&store).reduce(true)).await.unwrap();
    assert_eq!(output, ViewOutput::Reduced(serde_json::Value::Null));
    assert!(output.is_empty());
    assert_eq!(output.first(), None);
}

// ── Errors ──────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_view_fails_before_the_store() {
    declare();
    let store = blog_store();

    let err = Post::view("by_teacher", &on(&store)).await.unwrap_err();
    assert!(
        matches!(err, ModelError::NotFound { ref model, ref name } if model == "Post" && name == "by_teacher")
    );
    assert_eq!(store.view_queries(), 0);
    assert_eq!(store.design_writes(), 0);
}

#[derive(Debug)]
struct Orphan;

impl Model for Orphan {
    fn type_name() -> &'static str {
        "Orphan"
    }

    fn from_document(_doc: Document) -> ModelResult<Self> {
        Ok(Self)
    }
}

#[tokio::test]
async fn no_database_is_reported() {
    let err = Orphan::all(&ViewQuery::new()).await.unwrap_err();
    assert!(matches!(err, ModelError::NoDatabase { ref model } if model == "Orphan"));
    assert_eq!(err.to_string(), "no database configured for Orphan");
}

// ── first_from_view ─────────────────────────────────────────────

#[tokio::test]
async fn first_from_view_by_key() {
    declare();
    let store = blog_store();
    let extra = on(&store);

    let found = Comment::first_from_view("by_teacher", "Fred", Some(&extra))
        .await
        .unwrap()
        .and_then(ViewItem::into_model)
        .unwrap();
    assert_eq!(found.teacher, "Fred");

    let missing = Comment::first_from_view("by_teacher", "Nobody", Some(&extra))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn first_from_view_with_query() {
    declare();
    let store = blog_store();

    let first = Post::first_from_view("by_date", Lookup::from(on(&store).descending(true)), None)
        .await
        .unwrap()
        .and_then(ViewItem::into_model)
        .unwrap();
    assert_eq!(first.title, "Third");

    let row = Post::first_from_view("by_date", json!("2009-02-01"), Some(&on(&store).raw()))
        .await
        .unwrap()
        .and_then(ViewItem::into_row)
        .unwrap();
    assert_eq!(row.id.as_deref(), Some("p-a"));
}

// ── Streaming ───────────────────────────────────────────────────

#[tokio::test]
async fn view_with_streams_models_in_order() {
    declare();
    let store = blog_store();

    let mut seen = Vec::new();
    let delivered = Post::view_with("by_date", &on(&store), |item| {
        if let ViewItem::Model(post) = item {
            seen.push(post.title);
        }
    })
    .await
    .unwrap();

    assert_eq!(delivered, 3);
    assert_eq!(seen, vec!["First", "Second", "Third"]);
}

#[tokio::test]
async fn view_with_streams_rows_and_reduced_values() {
    declare();
    let store = blog_store();

    let mut rows = 0;
    let delivered = Comment::view_with("by_date", &on(&store).raw(), |item| {
        assert!(matches!(item, ViewItem::Row(_)));
        rows += 1;
    })
    .await
    .unwrap();
    assert_eq!((delivered, rows), (1, 1));

    let mut reduced = Vec::new();
    let delivered = Post::view_with("by_author", &on(&store).reduce(true), |item| {
        reduced.push(item);
    })
    .await
    .unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(reduced, vec![ViewItem::Reduced(json!(3))]);
}

// ── Declaration surface ─────────────────────────────────────────

#[derive(Debug)]
struct Draft;

impl Model for Draft {
    fn type_name() -> &'static str {
        "Draft"
    }

    fn from_document(_doc: Document) -> ModelResult<Self> {
        Ok(Self)
    }
}

#[tokio::test]
async fn declaring_and_checking_views_stays_local() {
    let store = Arc::new(MemoryStore::new("drafts"));
    Draft::use_database(store.clone());

    assert!(!Draft::has_view("by_title"));
    assert!(Draft::has_view("all"));
    assert_eq!(
        Draft::declare_view(&["title"], ViewOptions::default()).unwrap(),
        "by_title"
    );
    assert!(Draft::has_view("by_title"));
    assert!(!Draft::can_reduce_view("by_title"));
    assert_eq!(Draft::views().view_names(), vec!["all", "by_title"]);

    assert_eq!(store.design_writes(), 0);
    assert_eq!(store.view_queries(), 0);
}

#[test]
fn declaring_without_keys_or_name_fails() {
    let err = Draft::declare_view(&[], ViewOptions::default()).unwrap_err();
    assert!(matches!(err, ModelError::Definition(_)));
}

// ── Databases ───────────────────────────────────────────────────

#[derive(Debug, PartialEq, Deserialize)]
struct Lesson {
    #[serde(rename = "_id")]
    id: String,
}

impl Model for Lesson {
    fn type_name() -> &'static str {
        "Lesson"
    }

    fn from_document(doc: Document) -> ModelResult<Self> {
        materialize(doc)
    }
}

#[tokio::test]
async fn query_database_overrides_model_default() {
    let primary = MemoryStore::new("primary");
    primary.insert(Document::typed("Lesson", "l-1", json!({}))).unwrap();
    let primary = Arc::new(primary);
    let archive = MemoryStore::new("archive");
    archive.insert(Document::typed("Lesson", "l-2", json!({}))).unwrap();
    let archive = Arc::new(archive);

    Lesson::use_database(primary.clone());

    let lessons = Lesson::all(&ViewQuery::new()).await.unwrap().into_models();
    assert_eq!(lessons, vec![Lesson { id: "l-1".into() }]);

    let lessons = Lesson::all(&on(&archive)).await.unwrap().into_models();
    assert_eq!(lessons, vec![Lesson { id: "l-2".into() }]);

    // The design document was missing on the archive and got published there.
    assert_eq!(primary.design_writes(), 1);
    assert_eq!(archive.design_writes(), 1);
    assert!(archive.design_document("_design/Lesson").is_some());
}

// ── Shared registry ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(rename = "_id")]
    id: String,
}

impl Model for Article {
    fn type_name() -> &'static str {
        "Article"
    }

    fn from_document(doc: Document) -> ModelResult<Self> {
        materialize(doc)
    }
}

#[derive(Debug, Deserialize)]
struct Note {
    #[serde(rename = "_id")]
    id: String,
}

impl Model for Note {
    fn type_name() -> &'static str {
        "Note"
    }

    fn from_document(doc: Document) -> ModelResult<Self> {
        materialize(doc)
    }
}

#[tokio::test]
async fn models_sharing_a_registry_stay_isolated() {
    let blog = Arc::new(DesignRegistry::new("Blog"));
    let store = MemoryStore::new("blog");
    for (type_name, id, date) in [
        ("Article", "a-1", "2009-01-01"),
        ("Note", "n-1", "2009-01-02"),
        ("Article", "a-2", "2009-01-03"),
    ] {
        store
            .insert(Document::typed(type_name, id, json!({"date": date})))
            .unwrap();
    }
    let store = Arc::new(store);

    Catalog::global().register::<Article>(
        ModelViews::shared("Article", blog.clone())
            .unwrap()
            .with_database(store.clone()),
    );
    Catalog::global().register::<Note>(
        ModelViews::shared("Note", blog.clone())
            .unwrap()
            .with_database(store.clone()),
    );
    Article::declare_view(&["date"], ViewOptions::default()).unwrap();
    Note::declare_view(&["date"], ViewOptions::default()).unwrap();

    let views: Vec<String> = blog.document().views.into_keys().collect();
    assert_eq!(
        views,
        vec!["all@Article", "all@Note", "by_date@Article", "by_date@Note"]
    );

    let articles = Article::view("by_date", &ViewQuery::new()).await.unwrap().into_models();
    let ids: Vec<_> = articles.into_iter().map(|a| a.id).collect();
    assert_eq!(ids, vec!["a-1", "a-2"]);

    let notes = Note::view("by_date", &ViewQuery::new()).await.unwrap().into_models();
    let ids: Vec<_> = notes.into_iter().map(|n| n.id).collect();
    assert_eq!(ids, vec!["n-1"]);

    assert_eq!(store.design_writes(), 1);
}

// ── Redefinition across databases ───────────────────────────────

#[derive(Debug, PartialEq, Deserialize)]
struct Memo {
    #[serde(rename = "_id")]
    id: String,
}

impl Model for Memo {
    fn type_name() -> &'static str {
        "Memo"
    }

    fn from_document(doc: Document) -> ModelResult<Self> {
        materialize(doc)
    }
}

fn memo_store(name: &str) -> Arc<MemoryStore> {
    let store = MemoryStore::new(name);
    store
        .insert(Document::typed("Memo", "m-1", json!({"title": "Groceries"})))
        .unwrap();
    store
        .insert(Document::typed("Memo", "m-2", json!({"date": "2009-05-01"})))
        .unwrap();
    Arc::new(store)
}

fn memo_ids(memos: Vec<Memo>) -> Vec<String> {
    memos.into_iter().map(|m| m.id).collect()
}

#[tokio::test]
async fn redefined_view_reaches_default_database_after_override_query() {
    let home = memo_store("memos-home");
    let backup = memo_store("memos-backup");
    Memo::use_database(home.clone());

    Memo::declare_view(&["title"], ViewOptions::default().named("by_x")).unwrap();
    let memos = Memo::view("by_x", &ViewQuery::new()).await.unwrap().into_models();
    assert_eq!(memo_ids(memos), vec!["m-1"]);

    Memo::declare_view(&["date"], ViewOptions::default().named("by_x")).unwrap();
    let memos = Memo::view("by_x", &on(&backup)).await.unwrap().into_models();
    assert_eq!(memo_ids(memos), vec!["m-2"]);

    let memos = Memo::view("by_x", &ViewQuery::new()).await.unwrap().into_models();
    assert_eq!(memo_ids(memos), vec!["m-2"]);
    assert_eq!(home.design_writes(), 2);
    assert_eq!(backup.design_writes(), 1);
}
