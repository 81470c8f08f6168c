//! Per-capability module storage.
//!
//! A store owns every live instance of one component kind and is the only
//! place those instances are created or destroyed. [`SingleStore`] keeps at
//! most one module per entity, [`MultiStore`] an unbounded multiset.
//!
//! Capability-specific systems wrap a store and delegate the [`SystemStore`]
//! methods, layering their own pre-destroy / post-create behavior on top.

use std::any::{type_name, Any};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::arena::{ModuleArena, ModuleKey};
use super::entity::Entity;
use super::id::{EntityId, ModuleId, SystemKind};
use super::recipe::{AttachError, PartialComponent, RecipeBox};
use super::world::Entities;

/// Component instance data plus the two hooks the storage engine needs:
/// how to build an instance from a template, and how to recover a template
/// for the save/duplicate pipeline.
pub trait Module: Send + Sync + Sized + 'static {
    type Template: Clone + Send + Sync + 'static;

    fn instantiate(template: &Self::Template) -> Self;

    fn template(&self) -> Self::Template;
}

/// Marker for modules whose template is the instance itself: instantiation
/// and template recovery are both a clone. Unit structs make tag modules.
pub trait SimpleModule: Clone + Send + Sync + 'static {}

impl<T: SimpleModule> Module for T {
    type Template = T;

    fn instantiate(template: &T) -> T {
        template.clone()
    }

    fn template(&self) -> T {
        self.clone()
    }
}

impl SimpleModule for () {}

/// Type-erased store interface: what the world and the dispatch layer need
/// without knowing the concrete module type.
pub trait SystemStore: Send + Sync {
    fn kind(&self) -> SystemKind;

    /// The one dynamic type-recovery point: downcast the payload to this
    /// store's template type and create a module from it.
    ///
    /// On a mismatch the store can only name its own template type; the
    /// recipe layer rewrites `found` with the caller's type on the way out,
    /// so direct callers see a `"<opaque>"` placeholder there.
    fn attach(&mut self, entity: EntityId, template: &dyn Any) -> Result<(), AttachError>;

    /// Remove every module this store holds for `entity`. Idempotent.
    fn destroy_entity_modules(&mut self, entity: EntityId);

    /// Called by the world after the owning entity is fully constructed.
    fn post_create(&mut self, _entity: EntityId) {}

    fn has(&self, entity: EntityId) -> bool;

    /// Fresh recipes that would recreate this entity's modules if invoked.
    fn recreate_recipes(&self, entity: EntityId) -> Vec<RecipeBox>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Store holding at most one module per entity.
pub struct SingleStore<M: Module> {
    kind: SystemKind,
    arena: ModuleArena<M>,
    by_entity: HashMap<EntityId, ModuleKey>,
    owners: HashMap<ModuleKey, EntityId>,
}

impl<M: Module> SingleStore<M> {
    pub fn new(kind: SystemKind) -> Self {
        Self {
            kind,
            arena: ModuleArena::new(),
            by_entity: HashMap::new(),
            owners: HashMap::new(),
        }
    }

    pub fn kind(&self) -> SystemKind {
        self.kind
    }

    /// Create the module for `entity` from `template`.
    ///
    /// Panics if the entity already has one; recipes are the only caller and
    /// a second module under a single store is a broken invariant, not input.
    pub fn create_module(&mut self, entity: EntityId, template: &M::Template) -> ModuleKey {
        assert!(
            !self.by_entity.contains_key(&entity),
            "entity {entity} already has a `{}` module",
            self.kind
        );
        let key = self.arena.insert(M::instantiate(template));
        self.by_entity.insert(entity, key);
        self.owners.insert(key, entity);
        key
    }

    pub fn has(&self, entity: EntityId) -> bool {
        self.by_entity.contains_key(&entity)
    }

    pub fn get(&self, entity: EntityId) -> Option<&M> {
        self.arena.get(*self.by_entity.get(&entity)?)
    }

    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut M> {
        self.arena.get_mut(*self.by_entity.get(&entity)?)
    }

    pub fn key_of(&self, entity: EntityId) -> Option<ModuleKey> {
        self.by_entity.get(&entity).copied()
    }

    pub fn module(&self, key: ModuleKey) -> Option<&M> {
        self.arena.get(key)
    }

    pub fn module_mut(&mut self, key: ModuleKey) -> Option<&mut M> {
        self.arena.get_mut(key)
    }

    /// Reverse lookup from a module handle to its owning entity.
    ///
    /// Panics on stale or foreign keys; a tracked module always has an owner.
    pub fn owner_of(&self, key: ModuleKey) -> EntityId {
        match self.owners.get(&key) {
            Some(entity) if self.arena.contains(key) => *entity,
            _ => panic!("module key not tracked by `{}` store", self.kind),
        }
    }

    /// Remove this entity's module, if any.
    pub fn destroy_entity_modules(&mut self, entity: EntityId) {
        if let Some(key) = self.by_entity.remove(&entity) {
            self.owners.remove(&key);
            self.arena.remove(key);
        }
    }

    /// Apply `f` to every live module together with its owning entity.
    ///
    /// Panics if an owning entity is missing from `entities`: a module must
    /// never outlive its entity.
    pub fn for_each(
        &mut self,
        entities: &mut Entities,
        mut f: impl FnMut(EntityId, &mut Entity, &mut M),
    ) {
        for (&entity, &key) in &self.by_entity {
            let e = entities
                .get_mut(entity)
                .unwrap_or_else(|| panic!("module of `{}` outlived entity {entity}", self.kind));
            let module = self
                .arena
                .get_mut(key)
                .expect("forward map points at a live arena slot");
            f(entity, e, module);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &M)> {
        self.by_entity.iter().map(|(&entity, &key)| {
            (
                entity,
                self.arena
                    .get(key)
                    .expect("forward map points at a live arena slot"),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.by_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }

    pub fn recreate_recipe(&self, entity: EntityId) -> Option<PartialComponent<M::Template>> {
        self.get(entity)
            .map(|module| PartialComponent::new(module.template(), self.kind))
    }
}

impl<M: Module> SystemStore for SingleStore<M> {
    fn kind(&self) -> SystemKind {
        self.kind
    }

    fn attach(&mut self, entity: EntityId, template: &dyn Any) -> Result<(), AttachError> {
        let template = template.downcast_ref::<M::Template>().ok_or_else(|| {
            AttachError::TemplateMismatch {
                kind: self.kind,
                expected: type_name::<M::Template>(),
                found: "<opaque>",
            }
        })?;
        self.create_module(entity, template);
        Ok(())
    }

    fn destroy_entity_modules(&mut self, entity: EntityId) {
        SingleStore::destroy_entity_modules(self, entity);
    }

    fn has(&self, entity: EntityId) -> bool {
        SingleStore::has(self, entity)
    }

    fn recreate_recipes(&self, entity: EntityId) -> Vec<RecipeBox> {
        self.recreate_recipe(entity)
            .map(|r| vec![Arc::new(r) as RecipeBox])
            .unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Store holding any number of modules per entity.
pub struct MultiStore<M: Module> {
    kind: SystemKind,
    arena: ModuleArena<M>,
    by_entity: HashMap<EntityId, BTreeMap<ModuleId, ModuleKey>>,
    owners: HashMap<ModuleKey, EntityId>,
    // monotonic per entity; survives module removal so ids never recur,
    // dropped only when the entity's modules are destroyed wholesale
    next_module: HashMap<EntityId, u32>,
}

impl<M: Module> MultiStore<M> {
    pub fn new(kind: SystemKind) -> Self {
        Self {
            kind,
            arena: ModuleArena::new(),
            by_entity: HashMap::new(),
            owners: HashMap::new(),
            next_module: HashMap::new(),
        }
    }

    pub fn kind(&self) -> SystemKind {
        self.kind
    }

    pub fn create_module(&mut self, entity: EntityId, template: &M::Template) -> ModuleId {
        let counter = self.next_module.entry(entity).or_insert(0);
        let id = ModuleId::from_raw(*counter);
        *counter += 1;

        let key = self.arena.insert(M::instantiate(template));
        self.by_entity.entry(entity).or_default().insert(id, key);
        self.owners.insert(key, entity);
        id
    }

    pub fn has(&self, entity: EntityId) -> bool {
        self.by_entity.get(&entity).is_some_and(|set| !set.is_empty())
    }

    pub fn get(&self, entity: EntityId, module: ModuleId) -> Option<&M> {
        self.arena.get(*self.by_entity.get(&entity)?.get(&module)?)
    }

    pub fn get_mut(&mut self, entity: EntityId, module: ModuleId) -> Option<&mut M> {
        self.arena
            .get_mut(*self.by_entity.get(&entity)?.get(&module)?)
    }

    pub fn key_of(&self, entity: EntityId, module: ModuleId) -> Option<ModuleKey> {
        self.by_entity.get(&entity)?.get(&module).copied()
    }

    pub fn module(&self, key: ModuleKey) -> Option<&M> {
        self.arena.get(key)
    }

    pub fn module_mut(&mut self, key: ModuleKey) -> Option<&mut M> {
        self.arena.get_mut(key)
    }

    /// Module ids currently live for `entity`, in ascending order.
    pub fn module_ids(&self, entity: EntityId) -> Vec<ModuleId> {
        self.by_entity
            .get(&entity)
            .map(|set| set.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn remove_module(&mut self, entity: EntityId, module: ModuleId) -> Option<M> {
        let key = self.by_entity.get_mut(&entity)?.remove(&module)?;
        self.owners.remove(&key);
        self.arena.remove(key)
    }

    pub fn owner_of(&self, key: ModuleKey) -> EntityId {
        match self.owners.get(&key) {
            Some(entity) if self.arena.contains(key) => *entity,
            _ => panic!("module key not tracked by `{}` store", self.kind),
        }
    }

    /// Remove every module and the id counter. The world never reuses an
    /// `EntityId`, so dropping the counter cannot reissue an id to the same
    /// entity.
    pub fn destroy_entity_modules(&mut self, entity: EntityId) {
        if let Some(set) = self.by_entity.remove(&entity) {
            for (_, key) in set {
                self.owners.remove(&key);
                self.arena.remove(key);
            }
        }
        self.next_module.remove(&entity);
    }

    pub fn for_each(
        &mut self,
        entities: &mut Entities,
        mut f: impl FnMut(EntityId, &mut Entity, &mut M),
    ) {
        for (&entity, set) in &self.by_entity {
            for &key in set.values() {
                let e = entities.get_mut(entity).unwrap_or_else(|| {
                    panic!("module of `{}` outlived entity {entity}", self.kind)
                });
                let module = self
                    .arena
                    .get_mut(key)
                    .expect("forward map points at a live arena slot");
                f(entity, e, module);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

impl<M: Module> SystemStore for MultiStore<M> {
    fn kind(&self) -> SystemKind {
        self.kind
    }

    fn attach(&mut self, entity: EntityId, template: &dyn Any) -> Result<(), AttachError> {
        let template = template.downcast_ref::<M::Template>().ok_or_else(|| {
            AttachError::TemplateMismatch {
                kind: self.kind,
                expected: type_name::<M::Template>(),
                found: "<opaque>",
            }
        })?;
        self.create_module(entity, template);
        Ok(())
    }

    fn destroy_entity_modules(&mut self, entity: EntityId) {
        MultiStore::destroy_entity_modules(self, entity);
    }

    fn has(&self, entity: EntityId) -> bool {
        MultiStore::has(self, entity)
    }

    fn recreate_recipes(&self, entity: EntityId) -> Vec<RecipeBox> {
        let Some(set) = self.by_entity.get(&entity) else {
            return Vec::new();
        };
        set.values()
            .map(|&key| {
                let module = self
                    .arena
                    .get(key)
                    .expect("forward map points at a live arena slot");
                Arc::new(PartialComponent::new(module.template(), self.kind)) as RecipeBox
            })
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
