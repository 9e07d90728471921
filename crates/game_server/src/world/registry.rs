//! Name-keyed registry of loaded worlds.

use super::{World, WorldError, WorldId, WorldSpec};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Authoritative set of loaded worlds.
///
/// Names are unique. Creation goes through the map's entry API so a world is
/// either fully registered or not visible at all.
#[derive(Debug, Default)]
pub struct WorldRegistry {
    worlds: DashMap<String, Arc<World>>,
    next_sequence: AtomicU64,
}

impl WorldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a world named `spec.name`.
    ///
    /// # Arguments
    ///
    /// * `spec` - Name and parameters of the world
    /// * `build` - Constructs the world; only called when the name is free.
    ///   It runs while the name's shard is locked and must not call back into
    ///   this registry.
    ///
    /// # Returns
    ///
    /// The registered world, [`WorldError::DuplicateWorldName`] when the name
    /// is taken, or whatever error `build` produced.
    pub fn create<F>(&self, spec: &WorldSpec, build: F) -> Result<Arc<World>, WorldError>
    where
        F: FnOnce(&WorldSpec) -> Result<World, WorldError>,
    {
        match self.worlds.entry(spec.name.clone()) {
            Entry::Occupied(_) => Err(WorldError::DuplicateWorldName(spec.name.clone())),
            Entry::Vacant(slot) => {
                let mut world = build(spec)?;
                world.name = spec.name.clone();
                world.sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
                let world = Arc::new(world);
                slot.insert(world.clone());
                Ok(world)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<World>> {
        self.worlds.get(name).map(|w| w.value().clone())
    }

    pub fn get_by_id(&self, id: WorldId) -> Option<Arc<World>> {
        self.worlds
            .iter()
            .find(|entry| entry.value().id() == id)
            .map(|entry| entry.value().clone())
    }

    /// Removes `world` if that exact instance is registered. Does not save.
    pub fn remove(&self, world: &Arc<World>) -> bool {
        self.worlds
            .remove_if(world.name(), |_, registered| Arc::ptr_eq(registered, world))
            .is_some()
    }

    /// Snapshot of every registered world in creation order.
    pub fn list_all(&self) -> Vec<Arc<World>> {
        let mut worlds: Vec<Arc<World>> =
            self.worlds.iter().map(|entry| entry.value().clone()).collect();
        worlds.sort_by_key(|w| w.sequence());
        worlds
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }
}
