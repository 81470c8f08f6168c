pub mod ecs;
pub mod placement;

pub use ecs::{
    recipe, AttachError, Deferred, Entities, Entity, EntityId, Frame, Module, ModuleArena,
    ModuleId, ModuleKey, MultiStore, PartialComponent, Recipe, RecipeBox, SavedEntity,
    SimpleModule, SingleStore, SystemKind, SystemRegistry, SystemStore, World, WorldError,
};
pub use placement::Placement;
