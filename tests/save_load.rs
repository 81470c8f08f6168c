use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use worldcore::{
    recipe, AttachError, EntityId, PartialComponent, Placement, Recipe, RecipeBox, SimpleModule,
    SingleStore, SystemKind, SystemRegistry, SystemStore, World, WorldError,
};

const HEALTH: SystemKind = SystemKind::new("health");
const FOLLOW: SystemKind = SystemKind::new("follow");

#[derive(Debug, Clone, PartialEq)]
struct Health {
    max: f64,
    cur: f64,
}
impl SimpleModule for Health {}

fn hp(v: f64) -> Health {
    Health { max: v, cur: v }
}

/// Module referencing another entity; the reference must survive duplication
/// remapped, not verbatim.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Follow {
    target: EntityId,
}
impl SimpleModule for Follow {}

/// Remap-aware recipe for [`Follow`].
struct FollowRecipe {
    target: EntityId,
}

impl Recipe for FollowRecipe {
    fn kind(&self) -> SystemKind {
        FOLLOW
    }

    fn invoke(
        &self,
        entity: EntityId,
        systems: &mut SystemRegistry,
    ) -> Result<SystemKind, AttachError> {
        PartialComponent::new(
            Follow {
                target: self.target,
            },
            FOLLOW,
        )
        .invoke(entity, systems)
    }

    fn duplicate_update(&self, mapping: &HashMap<EntityId, EntityId>) -> Option<RecipeBox> {
        mapping
            .get(&self.target)
            .map(|&target| Arc::new(FollowRecipe { target }) as RecipeBox)
    }
}

/// Follow capability system: a plain store whose recreated recipes carry the
/// remap behavior.
struct FollowSystem {
    store: SingleStore<Follow>,
}

impl FollowSystem {
    fn new() -> Self {
        Self {
            store: SingleStore::new(FOLLOW),
        }
    }
}

impl SystemStore for FollowSystem {
    fn kind(&self) -> SystemKind {
        FOLLOW
    }

    fn attach(&mut self, entity: EntityId, template: &dyn Any) -> Result<(), AttachError> {
        self.store.attach(entity, template)
    }

    fn destroy_entity_modules(&mut self, entity: EntityId) {
        self.store.destroy_entity_modules(entity);
    }

    fn has(&self, entity: EntityId) -> bool {
        self.store.has(entity)
    }

    fn recreate_recipes(&self, entity: EntityId) -> Vec<RecipeBox> {
        self.store
            .get(entity)
            .map(|f| vec![Arc::new(FollowRecipe { target: f.target }) as RecipeBox])
            .unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn world() -> World {
    World::new(vec![
        Box::new(SingleStore::<Health>::new(HEALTH)),
        Box::new(FollowSystem::new()),
    ])
    .unwrap()
}

fn health_of(w: &World, id: EntityId) -> Health {
    w.systems()
        .get::<SingleStore<Health>>(HEALTH)
        .unwrap()
        .get(id)
        .unwrap()
        .clone()
}

fn follow_of(w: &World, id: EntityId) -> Follow {
    *w.systems()
        .get::<FollowSystem>(FOLLOW)
        .unwrap()
        .store
        .get(id)
        .unwrap()
}

#[test]
fn load_rebuilds_the_same_entity() {
    let mut w = world();
    let placement = Placement::from_pos(Vec3::new(1.0, 2.0, 3.0));
    let id = w.make_entity(&[recipe(hp(15.0), HEALTH)], placement).unwrap();
    w.systems_mut()
        .get_mut::<SingleStore<Health>>(HEALTH)
        .unwrap()
        .get_mut(id)
        .unwrap()
        .cur = 7.0;

    let saved = w.save_entity(id).unwrap();
    w.delete_entity(id);
    assert!(!w.has_entity(id));

    let loaded = w.load_entity(&saved).unwrap();
    assert_eq!(loaded, id);
    assert_eq!(w.entity(id).unwrap().placement, placement);
    assert_eq!(health_of(&w, id), Health { max: 15.0, cur: 7.0 });
}

#[test]
fn loading_over_a_live_entity_is_an_error() {
    let mut w = world();
    let id = w.make_entity(&[recipe(hp(1.0), HEALTH)], Placement::IDENTITY).unwrap();
    let saved = w.save_entity(id).unwrap();

    let err = w.load_entity(&saved).unwrap_err();
    assert_eq!(err, WorldError::DuplicateEntity(id));
    assert!(w.has_entity(id));
}

#[test]
fn saving_an_unknown_entity_is_an_error() {
    let w = world();
    let missing = EntityId::from_raw(42);
    let err = w.save_entities(&[missing]).unwrap_err();
    assert_eq!(err, WorldError::UnknownEntity(missing));
}

#[test]
fn duplicate_allocates_a_fresh_id() {
    let mut w = world();
    let id = w.make_entity(&[recipe(hp(15.0), HEALTH)], Placement::IDENTITY).unwrap();
    let saved = w.save_entity(id).unwrap();

    let copy = w.duplicate_entity(&saved).unwrap();
    assert_ne!(copy, id);
    assert!(w.has_entity(id) && w.has_entity(copy));
    assert_eq!(health_of(&w, copy), health_of(&w, id));
}

#[test]
fn value_recipes_decline_the_remap() {
    let mapping: HashMap<EntityId, EntityId> =
        [(EntityId::from_raw(0), EntityId::from_raw(5))].into();
    assert!(PartialComponent::new(hp(1.0), HEALTH)
        .duplicate_update(&mapping)
        .is_none());

    // a declined remap reuses the recipe handle itself
    let r = recipe(hp(1.0), HEALTH);
    let reused = r.duplicate_update(&mapping).unwrap_or_else(|| Arc::clone(&r));
    assert!(Arc::ptr_eq(&r, &reused));
}

#[test]
fn duplication_remaps_self_references() {
    let mut w = world();
    let id = w.make_entity(&[], Placement::IDENTITY).unwrap();
    // follows itself
    w.append_component(id, &FollowRecipe { target: id }).unwrap();
    assert_eq!(follow_of(&w, id).target, id);

    let saved = w.save_entity(id).unwrap();
    let copy = w.duplicate_entity(&saved).unwrap();
    assert_eq!(follow_of(&w, copy).target, copy);
    // the original is untouched
    assert_eq!(follow_of(&w, id).target, id);
}

#[test]
fn single_duplication_leaves_foreign_references_alone() {
    let mut w = world();
    let leader = w.make_entity(&[recipe(hp(5.0), HEALTH)], Placement::IDENTITY).unwrap();
    let follower = w.make_entity(&[], Placement::IDENTITY).unwrap();
    w.append_component(follower, &FollowRecipe { target: leader })
        .unwrap();

    // only the follower is duplicated; the leader is outside the batch
    let saved = w.save_entity(follower).unwrap();
    let copy = w.duplicate_entity(&saved).unwrap();
    assert_eq!(follow_of(&w, copy).target, leader);
}

#[test]
fn batch_duplication_remaps_references_within_the_batch() {
    let mut w = world();
    let leader = w.make_entity(&[recipe(hp(5.0), HEALTH)], Placement::IDENTITY).unwrap();
    let follower = w.make_entity(&[], Placement::IDENTITY).unwrap();
    w.append_component(follower, &FollowRecipe { target: leader })
        .unwrap();

    let saved = w.save_entities(&[follower, leader]).unwrap();
    let new_ids = w.duplicate_entities(&saved).unwrap();
    let (new_follower, new_leader) = (new_ids[0], new_ids[1]);

    assert_ne!(new_follower, follower);
    assert_ne!(new_leader, leader);
    assert_eq!(
        follow_of(&w, new_follower).target,
        new_leader,
        "the copied reference must point at the copied leader"
    );
    assert!(w.systems().store(HEALTH).unwrap().has(new_leader));
}

#[test]
fn load_bumps_the_id_allocator() {
    let mut w = world();
    let id = w.make_entity(&[recipe(hp(1.0), HEALTH)], Placement::IDENTITY).unwrap();
    let saved = w.save_entity(id).unwrap();
    w.delete_entity(id);

    let loaded = w.load_entity(&saved).unwrap();
    let fresh = w.make_entity(&[], Placement::IDENTITY).unwrap();
    assert_ne!(fresh, loaded);
}
