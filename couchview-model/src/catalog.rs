//! Per-model view state and the process-wide table that holds it.

use crate::error::ModelResult;
use crate::model::Model;
use couchview_design::{Defined, DesignRegistry};
use couchview_store::StoreConnection;
use couchview_types::{ViewDefinition, ViewOptions};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, warn};

/// The views of one model: its design registry and default database.
///
/// Several models may share one registry; each still only sees the views
/// it declared.
pub struct ModelViews {
    model: String,
    design: Arc<DesignRegistry>,
    database: RwLock<Option<Arc<dyn StoreConnection>>>,
}

impl fmt::Debug for ModelViews {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelViews")
            .field("model", &self.model)
            .field("design", &self.design.id())
            .field("database", &self.database().as_ref().map(|db| db.name().to_string()))
            .finish()
    }
}

impl ModelViews {
    /// Views of `model` in a registry of their own, namespaced by the model.
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        let design = Arc::new(DesignRegistry::new(model.as_str()));
        // A fresh registry accepts any first definition.
        if let Err(err) = design.define(ViewDefinition::all(&model)) {
            warn!("Could not declare the all view of {}: {}", model, err);
        }
        Self {
            model,
            design,
            database: RwLock::new(None),
        }
    }

    /// Views of `model` in a registry shared with other models.
    pub fn shared(model: impl Into<String>, design: Arc<DesignRegistry>) -> ModelResult<Self> {
        let model = model.into();
        design.define(ViewDefinition::all(&model))?;
        Ok(Self {
            model,
            design,
            database: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn with_database(self, database: Arc<dyn StoreConnection>) -> Self {
        self.use_database(database);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn design(&self) -> &Arc<DesignRegistry> {
        &self.design
    }

    /// Default connection for queries that do not name one.
    pub fn database(&self) -> Option<Arc<dyn StoreConnection>> {
        self.database
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn use_database(&self, database: Arc<dyn StoreConnection>) {
        debug!("{} now uses {}", self.model, database.name());
        *self.database.write().unwrap_or_else(PoisonError::into_inner) = Some(database);
    }

    /// Declares a view over `keys` and returns its name.
    pub fn declare(&self, keys: &[&str], options: ViewOptions) -> ModelResult<String> {
        let definition = ViewDefinition::synthesize(&self.model, keys, options)?;
        let name = definition.name.clone();
        if self.design.define(definition)? == Defined::Inserted {
            debug!("{} declared view {} in {}", self.model, name, self.design.id());
        }
        Ok(name)
    }

    pub fn has_view(&self, name: &str) -> bool {
        self.design.has_for(&self.model, name)
    }

    pub fn can_reduce_view(&self, name: &str) -> bool {
        self.design.can_reduce_for(&self.model, name)
    }

    /// Names of every view this model declared, `all` included.
    pub fn view_names(&self) -> Vec<String> {
        self.design.view_names(&self.model)
    }
}

/// Registration table of model views, keyed by model type.
///
/// Models without a registration get `ModelViews::new(M::type_name())` on
/// first use.
#[derive(Debug, Default)]
pub struct Catalog {
    models: RwLock<HashMap<TypeId, Arc<ModelViews>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide catalog used by [`Model::views`].
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Catalog> = OnceLock::new();
        GLOBAL.get_or_init(Catalog::new)
    }

    /// Views of `M`, created on first use.
    pub fn model<M: Model>(&self) -> Arc<ModelViews> {
        if let Some(views) = self.get::<M>() {
            return views;
        }
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            models
                .entry(TypeId::of::<M>())
                .or_insert_with(|| Arc::new(ModelViews::new(M::type_name()))),
        )
    }

    /// Views of `M`, if already created or registered.
    pub fn get<M: Model>(&self) -> Option<Arc<ModelViews>> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<M>())
            .cloned()
    }

    /// Installs `views` for `M`, replacing any earlier registration.
    ///
    /// Views declared through the replaced entry are not carried over, so
    /// register before declaring.
    pub fn register<M: Model>(&self, views: ModelViews) -> Arc<ModelViews> {
        let views = Arc::new(views);
        let previous = self
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<M>(), Arc::clone(&views));
        if previous.is_some() {
            warn!("Replaced the view registration of {}", M::type_name());
        }
        views
    }
}
