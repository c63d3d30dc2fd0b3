// Entity registry: static attributes of every known parking unit

use std::collections::BTreeMap;

use crate::types::{Location, Unit, UnitId};

/// Read-only after initialization. Iteration is in unit-id order.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    units: BTreeMap<UnitId, Unit>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit. A unit id already present keeps its original attributes.
    /// Returns true if the unit was added.
    pub fn register(&mut self, unit: Unit) -> bool {
        if self.units.contains_key(&unit.id) {
            return false;
        }
        self.units.insert(unit.id, unit);
        true
    }

    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn location_of(&self, id: UnitId) -> Option<Location> {
        self.units.get(&id).map(|u| u.location)
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }
}

impl FromIterator<Unit> for EntityRegistry {
    fn from_iter<I: IntoIterator<Item = Unit>>(iter: I) -> Self {
        let mut registry = Self::new();
        for unit in iter {
            registry.register(unit);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_keeps_first_attributes() {
        let mut registry = EntityRegistry::new();
        let id = UnitId::new(4);

        assert!(registry.register(Unit::new(id, Location::new(1.0, 2.0), 50)));
        assert!(!registry.register(Unit::new(id, Location::new(9.0, 9.0), 80)));

        let unit = registry.get(id).unwrap();
        assert_eq!(unit.capacity, 50);
        assert_eq!(registry.location_of(id), Some(Location::new(1.0, 2.0)));
        assert_eq!(registry.location_of(UnitId::new(5)), None);
    }

    #[test]
    fn test_ids_in_natural_order() {
        let registry: EntityRegistry = [12, 3, 7]
            .into_iter()
            .map(|i| Unit::new(UnitId::new(i), Location::new(0.0, 0.0), 10))
            .collect();

        let ids: Vec<u32> = registry.ids().map(|id| id.0).collect();
        assert_eq!(ids, vec![3, 7, 12]);
    }
}
