//! Update queue between stream workers and the tick

use std::collections::HashSet;
use std::mem;

use arsync_core::{ObjectId, ObjectInstance};
use parking_lot::Mutex;

/// Everything collected since the previous tick
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickBatch {
    /// Set events in arrival order
    pub sets: Vec<ObjectInstance>,
    pub deletes: Vec<ObjectId>,
    pub pending_prototypes: HashSet<String>,
}

impl TickBatch {
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.deletes.is_empty() && self.pending_prototypes.is_empty()
    }
}

/// Pending object events, each container behind its own lock
#[derive(Debug, Default)]
pub struct UpdateQueue {
    sets: Mutex<Vec<ObjectInstance>>,
    deletes: Mutex<Vec<ObjectId>>,
    pending_prototypes: Mutex<HashSet<String>>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_set(&self, instance: ObjectInstance) {
        self.sets.lock().push(instance);
    }

    pub fn push_delete(&self, id: ObjectId) {
        self.deletes.lock().push(id);
    }

    /// Record that a prototype is referenced and may need fetching
    pub fn mark_prototype_pending(&self, name: impl Into<String>) {
        self.pending_prototypes.lock().insert(name.into());
    }

    /// Take all three containers, leaving them empty
    pub fn drain(&self) -> TickBatch {
        TickBatch {
            sets: mem::take(&mut *self.sets.lock()),
            deletes: mem::take(&mut *self.deletes.lock()),
            pending_prototypes: mem::take(&mut *self.pending_prototypes.lock()),
        }
    }

    /// Drop everything pending
    pub fn clear(&self) {
        self.drain();
    }

    pub fn pending_sets(&self) -> usize {
        self.sets.lock().len()
    }

    pub fn pending_deletes(&self) -> usize {
        self.deletes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.lock().is_empty()
            && self.deletes.lock().is_empty()
            && self.pending_prototypes.lock().is_empty()
    }
}
