//! The compiled-artifact registry.
//!
//! Readers load the current snapshot without blocking. A writer copies the snapshot, adds its
//! entry and swaps the copy in; writers are serialized by a lock so no concurrent insert is lost.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use arc_swap::ArcSwap;

use crate::{mapper::MemberMap, metadata::typesystem::TypePair, Result};

/// Lookup key of a compiled artifact: the pair plus whether it takes an extra argument
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MapKey {
    /// The mapped pair
    pub pair: TypePair,
    /// The artifact takes an extra argument
    pub extra: bool,
}

impl MapKey {
    /// Key of the plain variant
    #[must_use]
    pub fn plain(pair: TypePair) -> Self {
        MapKey { pair, extra: false }
    }

    /// Key of the extra-argument variant
    #[must_use]
    pub fn with_extra(pair: TypePair) -> Self {
        MapKey { pair, extra: true }
    }
}

/// Copy-on-write map of compiled artifacts
pub struct MapRegistry {
    maps: ArcSwap<HashMap<MapKey, Arc<MemberMap>>>,
    write_lock: Mutex<()>,
}

impl Default for MapRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MapRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        MapRegistry {
            maps: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// The artifact registered under `key`
    #[must_use]
    pub fn get(&self, key: &MapKey) -> Option<Arc<MemberMap>> {
        self.maps.load().get(key).cloned()
    }

    /// Register `map`, replacing an earlier artifact with the same key
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the writer lock is poisoned.
    pub fn insert(&self, key: MapKey, map: Arc<MemberMap>) -> Result<()> {
        let _guard = lock!(self.write_lock);
        let mut next = HashMap::clone(&self.maps.load());
        next.insert(key, map);
        self.maps.store(Arc::new(next));
        Ok(())
    }

    /// Drop every registered artifact
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the writer lock is poisoned.
    pub fn clear(&self) -> Result<()> {
        let _guard = lock!(self.write_lock);
        self.maps.store(Arc::new(HashMap::new()));
        Ok(())
    }

    /// Number of registered artifacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.load().len()
    }

    /// Returns `true` if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current snapshot; later inserts do not affect it
    #[must_use]
    pub fn snapshot(&self) -> Arc<HashMap<MapKey, Arc<MemberMap>>> {
        self.maps.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::{CompiledFunction, MappingPlan, Stmt},
        config::MapperConfig,
        expr::Expr,
        metadata::typesystem::TypeRegistry,
    };

    fn member_map(registry: &TypeRegistry) -> Arc<MemberMap> {
        let string = registry.string();
        let mut plan = MappingPlan::new(&string, &string, None);
        plan.body = vec![Stmt::Return(Expr::Local(plan.source))];
        let pair = plan.pair;
        let function = CompiledFunction::compile(plan, &MapperConfig::default());
        Arc::new(MemberMap::new(pair, None, function, None))
    }

    #[test]
    fn test_snapshots_are_stable() {
        let types = TypeRegistry::new();
        let registry = MapRegistry::new();
        let map = member_map(&types);
        let key = MapKey::plain(map.pair);

        let before = registry.snapshot();
        registry.insert(key, map.clone()).unwrap();

        assert!(before.is_empty());
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&key).is_some());
        assert!(registry.get(&MapKey::with_extra(map.pair)).is_none());
    }

    #[test]
    fn test_clear_keeps_old_snapshots() {
        let types = TypeRegistry::new();
        let registry = MapRegistry::new();
        let map = member_map(&types);
        let key = MapKey::plain(map.pair);
        registry.insert(key, map).unwrap();

        let before = registry.snapshot();
        registry.clear().unwrap();

        assert_eq!(before.len(), 1);
        assert!(registry.is_empty());
        assert!(registry.get(&key).is_none());
    }
}
