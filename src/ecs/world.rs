//! World: entity lifecycle, deferred structural changes and the per-frame
//! update sequence.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, trace};
use thiserror::Error;

use super::entity::{Entity, SavedEntity};
use super::id::{EntityId, SystemKind};
use super::recipe::{AttachError, Recipe, RecipeBox};
use super::registry::SystemRegistry;
use super::store::SystemStore;
use crate::placement::Placement;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("two systems registered under capability `{0}`")]
    DuplicateKind(SystemKind),
    #[error("entity {0} already exists")]
    DuplicateEntity(EntityId),
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error(transparent)]
    Attach(#[from] AttachError),
}

/// All live entities. The world is the only inserter/eraser; systems get a
/// mutable borrow during the frame hook for lookups and placement edits.
pub struct Entities {
    map: HashMap<EntityId, Entity>,
}

impl Entities {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.map.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.map.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.map.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.map.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.map.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.map.values_mut()
    }

    fn insert(&mut self, entity: Entity) {
        self.map.insert(entity.id(), entity);
    }

    fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.map.remove(&id)
    }
}

struct PendingEntity {
    id: EntityId,
    recipes: Vec<RecipeBox>,
    placement: Placement,
}

/// Id allocation plus the staging queues for structural changes requested
/// mid-frame. Applied at the start of the next update, so system logic never
/// mutates containers another system is iterating.
pub struct Deferred {
    next_id: u64,
    creations: Vec<PendingEntity>,
    deletions: Vec<EntityId>,
}

impl Deferred {
    fn new() -> Self {
        Self {
            next_id: 0,
            creations: Vec::new(),
            deletions: Vec::new(),
        }
    }

    fn allocate(&mut self) -> EntityId {
        let id = EntityId::from_raw(self.next_id);
        self.next_id += 1;
        id
    }

    fn reserve_past(&mut self, id: EntityId) {
        self.next_id = self.next_id.max(id.raw() + 1);
    }

    /// Reserve an id now, construct the entity at the start of the next
    /// update. The id may be referenced by other pending operations in the
    /// same frame.
    pub fn make_entity_next_frame(
        &mut self,
        recipes: Vec<RecipeBox>,
        placement: Placement,
    ) -> EntityId {
        let id = self.allocate();
        trace!("queued creation of entity {id}");
        self.creations.push(PendingEntity {
            id,
            recipes,
            placement,
        });
        id
    }

    /// Flag an entity for deletion at the start of the next update. Ids that
    /// are unknown by then (or flagged twice) are skipped.
    pub fn delete_entity_next_frame(&mut self, id: EntityId) {
        trace!("queued deletion of entity {id}");
        self.deletions.push(id);
    }
}

/// Borrowed view handed to the per-frame hook: entity access plus the
/// deferred queues, with the system registry passed alongside.
pub struct Frame<'w> {
    pub dt: f64,
    pub entities: &'w mut Entities,
    pub defer: &'w mut Deferred,
}

/// Aggregate root: owns all entities, the capability registry and the
/// deferred queues.
pub struct World {
    entities: Entities,
    systems: SystemRegistry,
    defer: Deferred,
}

impl World {
    pub fn new(stores: Vec<Box<dyn SystemStore>>) -> Result<Self, WorldError> {
        Ok(Self {
            entities: Entities::new(),
            systems: SystemRegistry::new(stores)?,
            defer: Deferred::new(),
        })
    }

    pub fn has_entity(&self, id: EntityId) -> bool {
        self.entities.contains(id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    pub fn systems(&self) -> &SystemRegistry {
        &self.systems
    }

    pub fn systems_mut(&mut self) -> &mut SystemRegistry {
        &mut self.systems
    }

    /// Allocate an id and construct the entity immediately.
    ///
    /// Must not be called while any store is mid-iteration; use
    /// [`World::make_entity_next_frame`] from inside the frame hook.
    pub fn make_entity(
        &mut self,
        recipes: &[RecipeBox],
        placement: Placement,
    ) -> Result<EntityId, WorldError> {
        let id = self.defer.allocate();
        self.insert_entity(id, recipes, placement)?;
        Ok(id)
    }

    pub fn make_entity_next_frame(
        &mut self,
        recipes: Vec<RecipeBox>,
        placement: Placement,
    ) -> EntityId {
        self.defer.make_entity_next_frame(recipes, placement)
    }

    /// Destroy an entity immediately, notifying every related store once.
    ///
    /// Panics on unknown ids; ids are allocated internally, so an unknown id
    /// here is caller misuse. Must not be called mid-iteration; use
    /// [`World::delete_entity_next_frame`] from inside the frame hook.
    pub fn delete_entity(&mut self, id: EntityId) {
        let entity = self
            .entities
            .remove(id)
            .unwrap_or_else(|| panic!("deleted unknown entity {id}"));
        Self::notify_destroyed(&mut self.systems, &entity);
        debug!("destroyed entity {id}");
    }

    pub fn delete_entity_next_frame(&mut self, id: EntityId) {
        self.defer.delete_entity_next_frame(id);
    }

    /// Attach one more component to a live entity.
    pub fn append_component(&mut self, id: EntityId, recipe: &dyn Recipe) -> Result<(), WorldError> {
        if !self.entities.contains(id) {
            return Err(WorldError::UnknownEntity(id));
        }
        let kind = recipe.invoke(id, &mut self.systems)?;
        self.entities
            .get_mut(id)
            .expect("presence checked above")
            .add_related(kind);
        self.systems
            .store_mut(kind)
            .expect("store resolved during invoke")
            .post_create(id);
        Ok(())
    }

    /// Advance one frame: drain deletions, drain creations, snapshot previous
    /// placements, then run the caller's per-system update hook.
    ///
    /// The strict order means systems never observe half-deleted or
    /// half-created entities, and velocity queries during the hook are based
    /// on the placements entities had when the frame began.
    ///
    /// Every queued creation is applied even when an earlier one fails; a
    /// failed creation rolls itself back, the first error is returned, and
    /// the snapshot and hook phases are skipped for that frame.
    pub fn update<F>(&mut self, dt: f64, hook: F) -> Result<()>
    where
        F: FnOnce(&mut Frame<'_>, &mut SystemRegistry) -> Result<()>,
    {
        let deletions = std::mem::take(&mut self.defer.deletions);
        for id in deletions {
            if let Some(entity) = self.entities.remove(id) {
                Self::notify_destroyed(&mut self.systems, &entity);
                debug!("destroyed entity {id} (deferred)");
            }
        }

        let creations = std::mem::take(&mut self.defer.creations);
        let mut failed = None;
        for pending in creations {
            if let Err(err) = self.insert_entity(pending.id, &pending.recipes, pending.placement) {
                failed.get_or_insert(err);
            }
        }
        if let Some(err) = failed {
            return Err(err.into());
        }

        for entity in self.entities.iter_mut() {
            entity.update_prev(dt);
        }

        let mut frame = Frame {
            dt,
            entities: &mut self.entities,
            defer: &mut self.defer,
        };
        hook(&mut frame, &mut self.systems)
    }

    pub fn save_entity(&self, id: EntityId) -> Result<SavedEntity, WorldError> {
        self.entities
            .get(id)
            .map(|e| e.save(&self.systems))
            .ok_or(WorldError::UnknownEntity(id))
    }

    /// Snapshot a set of entities in the caller's order.
    pub fn save_entities(&self, ids: &[EntityId]) -> Result<Vec<SavedEntity>, WorldError> {
        ids.iter().map(|&id| self.save_entity(id)).collect()
    }

    /// Reconstruct a saved entity under its original id.
    ///
    /// Intended for round-tripping a world; a still-live id is a caller
    /// error. The id allocator is bumped past loaded ids so later allocations
    /// cannot collide.
    pub fn load_entity(&mut self, saved: &SavedEntity) -> Result<EntityId, WorldError> {
        self.defer.reserve_past(saved.id);
        self.insert_entity(saved.id, &saved.components, saved.placement)?;
        Ok(saved.id)
    }

    pub fn load_entities(&mut self, list: &[SavedEntity]) -> Result<Vec<EntityId>, WorldError> {
        list.iter().map(|saved| self.load_entity(saved)).collect()
    }

    /// Rebuild a saved entity under a fresh id, giving each recipe the chance
    /// to remap internal references to the new id.
    pub fn duplicate_entity(&mut self, saved: &SavedEntity) -> Result<EntityId, WorldError> {
        let ids = self.duplicate_entities(std::slice::from_ref(saved))?;
        Ok(ids[0])
    }

    /// Batch duplication: fresh ids are allocated for the whole batch first,
    /// so cross-references between batch members remap to each other's new
    /// ids rather than the old ones.
    pub fn duplicate_entities(&mut self, list: &[SavedEntity]) -> Result<Vec<EntityId>, WorldError> {
        let mut mapping: HashMap<EntityId, EntityId> = HashMap::with_capacity(list.len());
        for saved in list {
            mapping.insert(saved.id, self.defer.allocate());
        }

        let mut out = Vec::with_capacity(list.len());
        for saved in list {
            let recipes: Vec<RecipeBox> = saved
                .components
                .iter()
                .map(|r| r.duplicate_update(&mapping).unwrap_or_else(|| Arc::clone(r)))
                .collect();
            let new_id = mapping[&saved.id];
            self.insert_entity(new_id, &recipes, saved.placement)?;
            out.push(new_id);
        }
        Ok(out)
    }

    /// Destroy every entity, notifying stores. Entities always go before
    /// systems; this is the world-teardown path made explicit.
    pub fn clear_entities(&mut self) {
        let ids: Vec<EntityId> = self.entities.ids().collect();
        for id in ids {
            let entity = self.entities.remove(id).expect("listed above");
            Self::notify_destroyed(&mut self.systems, &entity);
        }
    }

    fn notify_destroyed(systems: &mut SystemRegistry, entity: &Entity) {
        for kind in entity.related_kinds() {
            systems
                .store_mut(kind)
                .unwrap_or_else(|| {
                    panic!("entity {} related to unregistered `{kind}`", entity.id())
                })
                .destroy_entity_modules(entity.id());
        }
    }

    /// Construct an entity under `id`: insert it, invoke every recipe,
    /// record the responding stores, then fire their post-create hooks.
    /// A failing recipe rolls back the modules attached so far.
    fn insert_entity(
        &mut self,
        id: EntityId,
        recipes: &[RecipeBox],
        placement: Placement,
    ) -> Result<(), WorldError> {
        if self.entities.contains(id) {
            return Err(WorldError::DuplicateEntity(id));
        }
        self.entities.insert(Entity::new(id, placement));

        let mut attached: Vec<SystemKind> = Vec::new();
        for recipe in recipes {
            match recipe.invoke(id, &mut self.systems) {
                Ok(kind) => {
                    if !attached.contains(&kind) {
                        attached.push(kind);
                    }
                }
                Err(err) => {
                    for kind in &attached {
                        self.systems
                            .store_mut(*kind)
                            .expect("store responded earlier")
                            .destroy_entity_modules(id);
                    }
                    self.entities.remove(id);
                    return Err(err.into());
                }
            }
        }

        let entity = self.entities.get_mut(id).expect("inserted above");
        for &kind in &attached {
            entity.add_related(kind);
        }
        for kind in attached {
            self.systems
                .store_mut(kind)
                .expect("store responded earlier")
                .post_create(id);
        }
        debug!("created entity {id} with {} component(s)", recipes.len());
        Ok(())
    }
}
