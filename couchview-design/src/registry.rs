//! The design registry: all view definitions of one namespace.
//!
//! Definitions are grouped by view name, then by declaring model. A name
//! declared by a single model is published under that name; once several
//! models declare the same name each copy is published as `name@Model`, so
//! every model keeps its own type guard and its own index.
//!
//! Publication is lazy and single-flight. Every change to the definition
//! set bumps a generation counter; `publish` records, per connection name,
//! the generation it wrote and skips that store while the generation is
//! current.

use crate::error::{DesignError, DesignResult};
use couchview_store::{StoreConnection, StoreError};
use couchview_types::{DesignDocument, QueryParams, ViewDefinition, ViewResponse};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How to resolve a definition that disagrees with one already known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Last writer wins; the replaced definition is logged.
    #[default]
    Overwrite,
    /// Keep what is there and report an error.
    Reject,
}

/// Outcome of [`DesignRegistry::define`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defined {
    Inserted,
    /// Identical definition already present.
    Unchanged,
    /// Different definition replaced under `ConflictPolicy::Overwrite`.
    Replaced,
}

/// Outcome of [`DesignRegistry::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publication {
    /// Current definitions were already published; the store was not contacted.
    AlreadyPublished,
    /// The design document did not exist and was written.
    Created,
    /// The store already held identical views.
    Unchanged,
    /// The store's design document was rewritten with the local views merged in.
    Updated,
}

/// Whether the current definitions have been written to a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Unpublished,
    Published,
}

#[derive(Debug, Default)]
struct Views {
    /// view name → declaring model → definition
    entries: BTreeMap<String, BTreeMap<String, ViewDefinition>>,
    /// Store names no longer rendered since their view name became shared.
    retired: BTreeSet<String>,
    generation: u64,
}

impl Views {
    fn store_name(&self, model: &str, name: &str) -> Option<String> {
        let models = self.entries.get(name)?;
        models
            .contains_key(model)
            .then(|| qualified_name(name, model, models.len() > 1))
    }

    fn render(&self, namespace: &str) -> DesignDocument {
        let mut doc = DesignDocument::new(namespace);
        for (name, models) in &self.entries {
            let shared = models.len() > 1;
            for (model, definition) in models {
                doc.views
                    .insert(qualified_name(name, model, shared), definition.functions.clone());
            }
        }
        doc
    }
}

fn qualified_name(name: &str, model: &str, shared: bool) -> String {
    if shared {
        format!("{name}@{model}")
    } else {
        name.to_string()
    }
}

/// View definitions of one namespace, published as `_design/<namespace>`.
#[derive(Debug)]
pub struct DesignRegistry {
    namespace: String,
    id: String,
    policy: ConflictPolicy,
    views: RwLock<Views>,
    /// Generation last written, by connection name.
    published: Mutex<HashMap<String, u64>>,
}

impl DesignRegistry {
    /// Creates an empty registry with the default `Overwrite` policy.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_policy(namespace, ConflictPolicy::default())
    }

    pub fn with_policy(namespace: impl Into<String>, policy: ConflictPolicy) -> Self {
        let namespace = namespace.into();
        let id = couchview_types::design_id(&namespace);
        Self {
            namespace,
            id,
            policy,
            views: RwLock::new(Views::default()),
            published: Mutex::new(HashMap::new()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Design document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    fn read_views(&self) -> RwLockReadGuard<'_, Views> {
        self.views.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_views(&self) -> RwLockWriteGuard<'_, Views> {
        self.views.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Definitions ──────────────────────────────────────────────

    /// Inserts a definition under its name and declaring model.
    pub fn define(&self, definition: ViewDefinition) -> DesignResult<Defined> {
        let mut views = self.write_views();
        let models = views.entries.entry(definition.name.clone()).or_default();

        let outcome = match models.get(&definition.model) {
            None => Defined::Inserted,
            Some(existing) if *existing == definition => return Ok(Defined::Unchanged),
            Some(_) if self.policy == ConflictPolicy::Reject => {
                return Err(DesignError::Conflict {
                    name: definition.name,
                    model: definition.model,
                });
            }
            Some(_) => {
                warn!(
                    "Redefining view {} of {} in {}",
                    definition.name, definition.model, self.id
                );
                Defined::Replaced
            }
        };

        let newly_shared = outcome == Defined::Inserted && models.len() == 1;
        if outcome == Defined::Inserted && !models.is_empty() {
            debug!(
                "View name {} in {} is now shared by {} models",
                definition.name,
                self.id,
                models.len() + 1
            );
        }
        let name = definition.name.clone();
        models.insert(definition.model.clone(), definition);
        if newly_shared {
            views.retired.insert(name);
        }
        views.generation += 1;
        Ok(outcome)
    }

    /// Whether any model declared `name`.
    pub fn has(&self, name: &str) -> bool {
        self.read_views().entries.contains_key(name)
    }

    /// Whether `model` declared `name`.
    pub fn has_for(&self, model: &str, name: &str) -> bool {
        self.read_views()
            .entries
            .get(name)
            .is_some_and(|models| models.contains_key(model))
    }

    /// Whether a definition of `name` carries a reduce function.
    pub fn can_reduce(&self, name: &str) -> bool {
        self.read_views()
            .entries
            .get(name)
            .is_some_and(|models| models.values().any(ViewDefinition::can_reduce))
    }

    /// Whether `model`'s definition of `name` carries a reduce function.
    pub fn can_reduce_for(&self, model: &str, name: &str) -> bool {
        self.definition(model, name)
            .is_some_and(|definition| definition.can_reduce())
    }

    pub fn definition(&self, model: &str, name: &str) -> Option<ViewDefinition> {
        self.read_views()
            .entries
            .get(name)
            .and_then(|models| models.get(model))
            .cloned()
    }

    /// Names of the views `model` declared.
    pub fn view_names(&self, model: &str) -> Vec<String> {
        self.read_views()
            .entries
            .iter()
            .filter(|(_, models)| models.contains_key(model))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Name under which `model`'s `name` view is stored.
    pub fn store_view_name(&self, model: &str, name: &str) -> Option<String> {
        self.read_views().store_name(model, name)
    }

    /// Renders all definitions as the design document to publish.
    pub fn document(&self) -> DesignDocument {
        self.read_views().render(&self.namespace)
    }

    /// Current definition-set generation.
    pub fn generation(&self) -> u64 {
        self.read_views().generation
    }

    // ── Publication ──────────────────────────────────────────────

    /// Forces the next `publish` to every store to contact it again.
    pub fn invalidate(&self) {
        self.write_views().generation += 1;
    }

    /// Whether the current definitions were written to `conn`.
    pub async fn state(&self, conn: &dyn StoreConnection) -> PublishState {
        let published = self.published.lock().await;
        if published.get(conn.name()) == Some(&self.generation()) {
            PublishState::Published
        } else {
            PublishState::Unpublished
        }
    }

    pub async fn is_published(&self, conn: &dyn StoreConnection) -> bool {
        self.state(conn).await == PublishState::Published
    }

    /// Writes the design document to `conn` unless already published there.
    ///
    /// Concurrent callers are serialized: only the first one talks to the
    /// store, the others find it published. Each connection, identified by
    /// its name, is tracked on its own. On failure the store stays
    /// unpublished and the next caller retries.
    pub async fn publish(&self, conn: &dyn StoreConnection) -> DesignResult<Publication> {
        self.sync(conn, false).await
    }

    /// Brings `conn`'s design document up to date. With `force` the store is
    /// checked even when the current generation was already published.
    async fn sync(&self, conn: &dyn StoreConnection, force: bool) -> DesignResult<Publication> {
        let mut published = self.published.lock().await;
        let (local, retired, generation) = {
            let views = self.read_views();
            (views.render(&self.namespace), views.retired.clone(), views.generation)
        };
        if !force && published.get(conn.name()) == Some(&generation) {
            return Ok(Publication::AlreadyPublished);
        }

        let outcome = match conn.get_design_document(&self.id).await? {
            None => {
                self.write(conn, &local).await?;
                Publication::Created
            }
            Some(mut remote) => {
                let differing = local.differing_views(&remote);
                let orphaned: Vec<String> = retired
                    .into_iter()
                    .filter(|name| remote.views.contains_key(name) && !local.views.contains_key(name))
                    .collect();
                if differing.is_empty() && orphaned.is_empty() {
                    Publication::Unchanged
                } else {
                    let conflicting: Vec<String> = differing
                        .into_iter()
                        .filter(|name| remote.views.contains_key(name))
                        .collect();
                    if !conflicting.is_empty() {
                        if self.policy == ConflictPolicy::Reject {
                            return Err(DesignError::PublishConflict {
                                design: self.id.clone(),
                                views: conflicting,
                            });
                        }
                        warn!(
                            "Overwriting views {:?} of {} on {}",
                            conflicting,
                            self.id,
                            conn.name()
                        );
                    }
                    remote.merge_views(&local);
                    if !orphaned.is_empty() {
                        info!(
                            "Pruning views {:?} of {} on {}, now qualified per model",
                            orphaned,
                            self.id,
                            conn.name()
                        );
                        for name in &orphaned {
                            remote.views.remove(name);
                        }
                    }
                    self.write(conn, &remote).await?;
                    Publication::Updated
                }
            }
        };

        published.insert(conn.name().to_string(), generation);
        info!("Published {} to {}: {:?}", self.id, conn.name(), outcome);
        Ok(outcome)
    }

    async fn write(&self, conn: &dyn StoreConnection, doc: &DesignDocument) -> DesignResult<String> {
        conn.put_design_document(doc).await.map_err(|e| match e {
            StoreError::Conflict(_) => DesignError::PublishConflict {
                design: self.id.clone(),
                views: doc.views.keys().cloned().collect(),
            },
            other => other.into(),
        })
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Runs `model`'s `name` view, publishing first if needed.
    ///
    /// When the store does not know the view (the design document is
    /// missing on this database) the registry republishes to that store and
    /// retries once.
    pub async fn query(
        &self,
        conn: &dyn StoreConnection,
        model: &str,
        name: &str,
        params: &QueryParams,
    ) -> DesignResult<ViewResponse> {
        let view = self
            .store_view_name(model, name)
            .ok_or_else(|| DesignError::NotFound {
                name: name.to_string(),
            })?;

        self.publish(conn).await?;

        debug!("Querying {}/{} on {}", self.id, view, conn.name());
        match conn.query_view(&self.id, &view, params).await {
            Err(StoreError::NotFound(what)) => {
                warn!(
                    "{} missing on {}, republishing {}",
                    what,
                    conn.name(),
                    self.id
                );
                self.sync(conn, true).await?;
                Ok(conn.query_view(&self.id, &view, params).await?)
            }
            result => Ok(result?),
        }
    }
}
