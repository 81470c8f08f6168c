//! Module-based entity-component core.
//!
//! Entities are opaque ids with a placement; all component data ("modules")
//! lives in per-capability stores. A [`Recipe`] is the only way a module comes
//! into existence, which guarantees no module ever floats free of a valid
//! entity id.

pub mod arena;
pub mod entity;
pub mod id;
pub mod recipe;
pub mod registry;
pub mod store;
pub mod world;

pub use arena::{ModuleArena, ModuleKey};
pub use entity::{Entity, SavedEntity};
pub use id::{EntityId, ModuleId, SystemKind};
pub use recipe::{recipe, AttachError, PartialComponent, Recipe, RecipeBox};
pub use registry::SystemRegistry;
pub use store::{Module, MultiStore, SimpleModule, SingleStore, SystemStore};
pub use world::{Deferred, Entities, Frame, World, WorldError};
