//! Capability tag -> store registry.
//!
//! Built once from the initial store list when the world is constructed and
//! never mutated afterwards.

use std::collections::HashMap;

use super::id::SystemKind;
use super::store::SystemStore;
use super::world::WorldError;

pub struct SystemRegistry {
    by_kind: HashMap<SystemKind, Box<dyn SystemStore>>,
}

impl std::fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemRegistry")
            .field("kinds", &self.by_kind.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SystemRegistry {
    /// Index the stores by capability tag. Two stores claiming the same tag
    /// is a configuration error.
    pub fn new(stores: Vec<Box<dyn SystemStore>>) -> Result<Self, WorldError> {
        let mut by_kind = HashMap::with_capacity(stores.len());
        for store in stores {
            let kind = store.kind();
            if by_kind.insert(kind, store).is_some() {
                return Err(WorldError::DuplicateKind(kind));
            }
        }
        Ok(Self { by_kind })
    }

    pub fn store(&self, kind: SystemKind) -> Option<&dyn SystemStore> {
        self.by_kind.get(&kind).map(|s| s.as_ref())
    }

    pub fn store_mut(&mut self, kind: SystemKind) -> Option<&mut (dyn SystemStore + 'static)> {
        self.by_kind.get_mut(&kind).map(|s| s.as_mut())
    }

    /// Typed access to the concrete store registered under `kind`.
    pub fn get<S: 'static>(&self, kind: SystemKind) -> Option<&S> {
        self.by_kind.get(&kind)?.as_any().downcast_ref::<S>()
    }

    pub fn get_mut<S: 'static>(&mut self, kind: SystemKind) -> Option<&mut S> {
        self.by_kind.get_mut(&kind)?.as_any_mut().downcast_mut::<S>()
    }

    pub fn kinds(&self) -> impl Iterator<Item = SystemKind> + '_ {
        self.by_kind.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::store::{SimpleModule, SingleStore};

    const HEALTH: SystemKind = SystemKind::new("health");

    #[derive(Debug, Clone)]
    struct Health(f64);
    impl SimpleModule for Health {}

    #[test]
    fn duplicate_kind_is_a_configuration_error() {
        let err = SystemRegistry::new(vec![
            Box::new(SingleStore::<Health>::new(HEALTH)),
            Box::new(SingleStore::<Health>::new(HEALTH)),
        ])
        .unwrap_err();
        assert!(matches!(err, WorldError::DuplicateKind(k) if k == HEALTH));
    }

    #[test]
    fn typed_lookup_goes_through_the_tag() {
        let mut registry =
            SystemRegistry::new(vec![Box::new(SingleStore::<Health>::new(HEALTH))]).unwrap();
        assert!(registry.get::<SingleStore<Health>>(HEALTH).is_some());
        assert!(registry.get_mut::<SingleStore<Health>>(HEALTH).is_some());
        // wrong concrete type under the right tag
        assert!(registry.get::<SingleStore<()>>(HEALTH).is_none());
        assert!(registry.store(SystemKind::new("missing")).is_none());
    }
}
