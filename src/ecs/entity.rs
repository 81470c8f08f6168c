//! Entity: identity, placement history and owning-system bookkeeping.

use std::collections::BTreeSet;
use std::fmt;

use glam::{Quat, Vec3};

use super::id::{EntityId, SystemKind};
use super::recipe::RecipeBox;
use super::registry::SystemRegistry;
use crate::placement::Placement;

/// An identity with a placement and a set of attached component modules.
///
/// Constructed only by the world; the related-kind set always matches the set
/// of stores holding modules for this entity, except transiently while it is
/// being torn down.
pub struct Entity {
    id: EntityId,
    pub placement: Placement,
    prev_placement: Placement,
    prev_dt: f64,
    related: BTreeSet<SystemKind>,
}

impl Entity {
    pub(crate) fn new(id: EntityId, placement: Placement) -> Self {
        Self {
            id,
            placement,
            prev_placement: placement,
            prev_dt: 1.0,
            related: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Snapshot the current placement as last frame's, recording the elapsed
    /// time for the velocity queries below.
    pub(crate) fn update_prev(&mut self, dt: f64) {
        self.prev_placement = self.placement;
        self.prev_dt = dt;
    }

    pub fn prev_placement(&self) -> Placement {
        self.prev_placement
    }

    /// Position change since the last snapshot.
    pub fn frame_velocity(&self) -> Vec3 {
        self.placement.pos - self.prev_placement.pos
    }

    pub fn velocity(&self) -> Vec3 {
        self.frame_velocity() / self.prev_dt as f32
    }

    /// Rotation relative to the last snapshot.
    pub fn frame_rotation(&self) -> Quat {
        self.placement.rot * self.prev_placement.rot.inverse()
    }

    /// Axis-angle rate of rotation since the last snapshot.
    pub fn angular_velocity(&self) -> Vec3 {
        let (axis, angle) = self.frame_rotation().to_axis_angle();
        axis * (angle / self.prev_dt as f32)
    }

    pub fn related_kinds(&self) -> impl Iterator<Item = SystemKind> + '_ {
        self.related.iter().copied()
    }

    pub fn is_related(&self, kind: SystemKind) -> bool {
        self.related.contains(&kind)
    }

    pub(crate) fn add_related(&mut self, kind: SystemKind) {
        self.related.insert(kind);
    }

    /// Bundle recreated recipes for every attached module with the current
    /// placement into a value snapshot independent of live store state.
    pub fn save(&self, systems: &SystemRegistry) -> SavedEntity {
        let mut components: Vec<RecipeBox> = Vec::new();
        for kind in self.related.iter().copied() {
            let store = systems
                .store(kind)
                .unwrap_or_else(|| panic!("entity {} related to unregistered `{kind}`", self.id));
            components.extend(store.recreate_recipes(self.id));
        }
        SavedEntity {
            id: self.id,
            components,
            placement: self.placement,
        }
    }
}

/// Value snapshot of one entity: id, recreated component recipes and
/// placement. Reloading it rebuilds an equivalent entity; persistence to
/// bytes is a collaborator's concern, not ours.
#[derive(Clone)]
pub struct SavedEntity {
    pub id: EntityId,
    pub components: Vec<RecipeBox>,
    pub placement: Placement,
}

impl fmt::Debug for SavedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<SystemKind> = self.components.iter().map(|c| c.kind()).collect();
        f.debug_struct("SavedEntity")
            .field("id", &self.id)
            .field("components", &kinds)
            .field("placement", &self.placement)
            .finish()
    }
}
