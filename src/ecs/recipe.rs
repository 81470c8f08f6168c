//! Component recipes: type-erased "attach this module" instructions.
//!
//! A recipe carries a template value and the capability tag of the store meant
//! to consume it. Invoking the recipe against a registry is the single entry
//! point through which modules are created, for construction, loading and
//! duplication alike.

use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::id::{EntityId, SystemKind};
use super::registry::SystemRegistry;

/// Shared recipe handle; recipe lists are cloned freely during save/duplicate.
pub type RecipeBox = Arc<dyn Recipe>;

/// Failure of the dispatch step that turns a recipe into a module.
///
/// Both variants are misconfiguration, not internal corruption, so they are
/// surfaced as values rather than panics.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttachError {
    #[error("no system registered for capability `{0}`")]
    UnknownKind(SystemKind),
    #[error("system `{kind}` consumes `{expected}` templates, recipe carries `{found}`")]
    TemplateMismatch {
        kind: SystemKind,
        expected: &'static str,
        found: &'static str,
    },
}

pub trait Recipe: Send + Sync {
    /// Capability tag of the store this recipe targets.
    fn kind(&self) -> SystemKind;

    /// Resolve the target store and create one module for `entity`.
    ///
    /// Returns the tag of the store that consumed the recipe so the caller can
    /// record the entity/system relation.
    fn invoke(
        &self,
        entity: EntityId,
        systems: &mut SystemRegistry,
    ) -> Result<SystemKind, AttachError>;

    /// Offered a chance to rewrite internal entity references during a batch
    /// duplication. `None` means "reuse this recipe unchanged", which is right
    /// for value-only components.
    fn duplicate_update(&self, _mapping: &HashMap<EntityId, EntityId>) -> Option<RecipeBox> {
        None
    }
}

/// Recipe for a plain template value: look up the store registered under
/// `kind` and hand it the template.
pub struct PartialComponent<T> {
    template: T,
    kind: SystemKind,
}

impl<T> PartialComponent<T> {
    pub fn new(template: T, kind: SystemKind) -> Self {
        Self { template, kind }
    }

    pub fn template(&self) -> &T {
        &self.template
    }
}

impl PartialComponent<()> {
    /// Recipe for a tag module (no payload).
    pub fn marker(kind: SystemKind) -> Self {
        Self::new((), kind)
    }
}

impl<T: Clone + Send + Sync + 'static> Recipe for PartialComponent<T> {
    fn kind(&self) -> SystemKind {
        self.kind
    }

    fn invoke(
        &self,
        entity: EntityId,
        systems: &mut SystemRegistry,
    ) -> Result<SystemKind, AttachError> {
        let store = systems
            .store_mut(self.kind)
            .ok_or(AttachError::UnknownKind(self.kind))?;
        store
            .attach(entity, &self.template)
            .map_err(|err| match err {
                // the store only knows its own template type; fill in ours
                AttachError::TemplateMismatch { kind, expected, .. } => {
                    AttachError::TemplateMismatch {
                        kind,
                        expected,
                        found: type_name::<T>(),
                    }
                }
                other => other,
            })?;
        Ok(self.kind)
    }
}

/// Boxes a template into a shared recipe.
pub fn recipe<T: Clone + Send + Sync + 'static>(template: T, kind: SystemKind) -> RecipeBox {
    Arc::new(PartialComponent::new(template, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::store::{SimpleModule, SingleStore};

    const HEALTH: SystemKind = SystemKind::new("health");
    const HITBOX: SystemKind = SystemKind::new("hitbox");

    #[derive(Debug, Clone, PartialEq)]
    struct Health(f64);
    impl SimpleModule for Health {}

    #[derive(Debug, Clone, PartialEq)]
    struct Hitbox(f64);
    impl SimpleModule for Hitbox {}

    fn registry() -> SystemRegistry {
        SystemRegistry::new(vec![Box::new(SingleStore::<Health>::new(HEALTH))]).unwrap()
    }

    #[test]
    fn invoke_creates_a_module() {
        let mut systems = registry();
        let e = EntityId::from_raw(0);
        let kind = PartialComponent::new(Health(15.0), HEALTH)
            .invoke(e, &mut systems)
            .unwrap();
        assert_eq!(kind, HEALTH);
        let store = systems.get::<SingleStore<Health>>(HEALTH).unwrap();
        assert_eq!(store.get(e), Some(&Health(15.0)));
    }

    #[test]
    fn unknown_kind_is_reported() {
        let mut systems = registry();
        let err = PartialComponent::new(Hitbox(1.0), HITBOX)
            .invoke(EntityId::from_raw(0), &mut systems)
            .unwrap_err();
        assert_eq!(err, AttachError::UnknownKind(HITBOX));
    }

    #[test]
    fn template_mismatch_names_both_types() {
        // a hitbox recipe wrongly aimed at the health store
        let mut systems = registry();
        let err = PartialComponent::new(Hitbox(1.0), HEALTH)
            .invoke(EntityId::from_raw(0), &mut systems)
            .unwrap_err();
        match err {
            AttachError::TemplateMismatch {
                kind,
                expected,
                found,
            } => {
                assert_eq!(kind, HEALTH);
                assert!(expected.contains("Health"));
                assert!(found.contains("Hitbox"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
