//! Shared prototype and mesh cache
//!
//! Filled by background fetches, read by the tick. A prototype name is
//! "in flight" from the moment a fetch is claimed for it until that fetch
//! finishes, successful or not; claiming is what keeps a name from being
//! fetched twice.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arsync_core::{MeshData, ObjectPrototype};
use parking_lot::{Mutex, RwLock};

/// A prototype together with its mesh
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrototype {
    pub prototype: Arc<ObjectPrototype>,
    pub mesh: Arc<MeshData>,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetStats {
    pub prototypes: usize,
    pub meshes: usize,
    pub in_flight: usize,
    pub fetches_started: u64,
    pub fetches_finished: u64,
}

#[derive(Debug, Default)]
pub struct AssetCache {
    prototypes: RwLock<HashMap<String, Arc<ObjectPrototype>>>,
    meshes: RwLock<HashMap<String, Arc<MeshData>>>,
    in_flight: Mutex<HashSet<String>>,
    fetches_started: AtomicU64,
    fetches_finished: AtomicU64,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_prototype(&self, prototype: ObjectPrototype) {
        self.prototypes
            .write()
            .insert(prototype.name.clone(), Arc::new(prototype));
    }

    pub fn insert_mesh(&self, mesh: MeshData) {
        self.meshes.write().insert(mesh.name.clone(), Arc::new(mesh));
    }

    pub fn prototype(&self, name: &str) -> Option<Arc<ObjectPrototype>> {
        self.prototypes.read().get(name).cloned()
    }

    pub fn mesh(&self, name: &str) -> Option<Arc<MeshData>> {
        self.meshes.read().get(name).cloned()
    }

    pub fn has_mesh(&self, name: &str) -> bool {
        self.meshes.read().contains_key(name)
    }

    /// Prototype and its mesh, only when both are cached
    pub fn resolve(&self, name: &str) -> Option<ResolvedPrototype> {
        let prototype = self.prototype(name)?;
        let mesh = self.mesh(&prototype.mesh_name)?;
        Some(ResolvedPrototype { prototype, mesh })
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Of the given mesh names, those not cached yet
    pub fn missing_meshes<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let meshes = self.meshes.read();
        let mut missing: Vec<String> = names
            .into_iter()
            .filter(|name| !meshes.contains_key(*name))
            .map(str::to_string)
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Claim unresolved, not yet fetching names for a new fetch
    ///
    /// Returns the claimed names, sorted; empty means nothing to fetch.
    pub fn begin_fetch<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut in_flight = self.in_flight.lock();
        let mut claimed: Vec<String> = names
            .into_iter()
            .filter(|name| !in_flight.contains(*name) && !self.is_resolved(name))
            .map(str::to_string)
            .collect();
        claimed.sort();
        claimed.dedup();

        if !claimed.is_empty() {
            in_flight.extend(claimed.iter().cloned());
            self.fetches_started.fetch_add(1, Ordering::Relaxed);
        }
        claimed
    }

    /// Release names claimed by `begin_fetch`
    pub fn finish_fetch(&self, names: &[String]) {
        let mut in_flight = self.in_flight.lock();
        for name in names {
            in_flight.remove(name);
        }
        self.fetches_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight.lock().contains(name)
    }

    /// Forget every asset and every claim
    pub fn clear(&self) {
        self.prototypes.write().clear();
        self.meshes.write().clear();
        self.in_flight.lock().clear();
    }

    pub fn stats(&self) -> AssetStats {
        AssetStats {
            prototypes: self.prototypes.read().len(),
            meshes: self.meshes.read().len(),
            in_flight: self.in_flight.lock().len(),
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            fetches_finished: self.fetches_finished.load(Ordering::Relaxed),
        }
    }
}
