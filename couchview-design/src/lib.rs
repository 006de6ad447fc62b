//! Design document registry for couchview.
//!
//! A [`DesignRegistry`] owns every view definition of one namespace and is
//! the source of truth for the design document `_design/<namespace>`:
//! - definitions are added at declaration time, without touching the store
//! - the design document is published lazily, once, on first query
//! - redefinition or a changed index set makes the next query republish
//!
//! One registry can serve several models. Each model's definitions keep
//! their own type guard, so query results stay isolated per model.

mod error;
mod registry;

pub use error::{DesignError, DesignResult};
pub use registry::{ConflictPolicy, Defined, DesignRegistry, Publication, PublishState};
