//! Per-tick reconciliation
//!
//! Runs once per tick on the consumer thread and never awaits network I/O:
//! 1. take the batch collected since the previous tick
//! 2. claim background fetches for unresolved prototypes
//! 3. drop sets whose id is deleted in the same batch (delete wins)
//! 4. prune instances the engine no longer holds, apply deletes, then sets
//!
//! A prototype-backed set that cannot be resolved yet is carried over to the
//! next tick while its fetch is in flight, and dropped once the fetch ended
//! without producing the prototype.

use std::collections::{HashMap, HashSet};
use std::mem;

use arsync_core::{ObjectId, ObjectInstance};

use crate::{resolve_instance, AssetCache, ObjectVisual, Resolution, TickBatch};

/// Receiver of scene changes, usually the engine
pub trait SceneSink {
    /// False once the engine destroyed the object on its own
    fn is_alive(&self, id: &ObjectId) -> bool;

    fn on_object_instance(&mut self, visual: &ObjectVisual);

    fn on_object_deleted(&mut self, id: &ObjectId);
}

/// Starts prototype fetches off the tick
pub trait AssetFetcher {
    /// Fetch the named prototypes and their meshes into the asset cache, then
    /// release the names with [`AssetCache::finish_fetch`]. Must not block.
    fn request(&self, prototype_names: Vec<String>);
}

/// Counters for one reconciliation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub applied: u32,
    pub deleted: u32,
    pub pruned: u32,
    /// Sets discarded because the same batch deleted their id
    pub superseded: u32,
    pub deferred: u32,
    pub dropped: u32,
    pub fetch_requested: u32,
}

impl ReconciliationResult {
    pub fn is_noop(&self) -> bool {
        *self == ReconciliationResult::default()
    }
}

/// Live scene registry plus the sets waiting for assets
#[derive(Debug, Default)]
pub struct Reconciler {
    live: HashMap<ObjectId, ObjectInstance>,
    deferred: Vec<ObjectInstance>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one batch
    pub fn reconcile(
        &mut self,
        batch: TickBatch,
        assets: &AssetCache,
        fetcher: &dyn AssetFetcher,
        sink: &mut dyn SceneSink,
    ) -> ReconciliationResult {
        let mut result = ReconciliationResult::default();
        let TickBatch {
            sets: incoming,
            deletes,
            pending_prototypes,
        } = batch;

        // Fetch what this batch references but is neither cached nor
        // already fetching. Carried-over sets never trigger a refetch.
        let claimed = assets.begin_fetch(
            pending_prototypes
                .iter()
                .map(String::as_str)
                .chain(incoming.iter().filter_map(ObjectInstance::prototype_name)),
        );
        if !claimed.is_empty() {
            result.fetch_requested = claimed.len() as u32;
            tracing::debug!(prototypes = ?claimed, "requesting prototype fetch");
            fetcher.request(claimed);
        }

        let mut sets = mem::take(&mut self.deferred);
        sets.extend(incoming);

        // Delete wins over a set for the same id within one batch
        let deleted: HashSet<&ObjectId> = deletes.iter().collect();
        let before = sets.len();
        sets.retain(|instance| !deleted.contains(instance.id()));
        result.superseded = (before - sets.len()) as u32;

        let before = self.live.len();
        self.live.retain(|id, _| sink.is_alive(id));
        result.pruned = (before - self.live.len()) as u32;

        for id in &deletes {
            if self.live.remove(id).is_some() {
                sink.on_object_deleted(id);
                result.deleted += 1;
            } else {
                tracing::trace!(?id, "delete for unknown object");
            }
        }

        for instance in sets {
            // a later set for the same id replaces anything still waiting
            self.deferred.retain(|waiting| waiting.id() != instance.id());

            match resolve_instance(&instance, assets) {
                Resolution::Ready(visual) => {
                    sink.on_object_instance(&visual);
                    self.live.insert(instance.id().clone(), instance);
                    result.applied += 1;
                }
                Resolution::Missing(name) if assets.is_in_flight(&name) => {
                    self.deferred.push(instance);
                }
                Resolution::Missing(name) => {
                    tracing::warn!(
                        id = %instance.id(),
                        prototype = %name,
                        "prototype unavailable, dropping object"
                    );
                    result.dropped += 1;
                }
            }
        }
        result.deferred = self.deferred.len() as u32;

        if !result.is_noop() {
            tracing::debug!(?result, live = self.live.len(), "reconciled");
        }
        result
    }

    /// Remove every instance, telling the sink about each live one
    pub fn clear(&mut self, sink: &mut dyn SceneSink) {
        for id in self.live.keys() {
            sink.on_object_deleted(id);
        }
        self.live.clear();
        self.deferred.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    pub fn instance(&self, id: &str) -> Option<&ObjectInstance> {
        self.live.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.live.keys()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Sets waiting for their prototype
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }
}
