//! Engine observers
//!
//! The engine side registers one or more observers with the session. Scene
//! and robot callbacks run inside `Session::tick`; channel changes also
//! report deletes and `on_channel_changed` from the caller of the change.
//! No session lock is held while an observer runs, so observers may query
//! the session from their callbacks.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use arsync_core::{Generation, JointsSynced, ObjectId, Vec3, VisualChange, VoxelData};
use arsync_state::{ObjectVisual, SceneSink};

/// Which robot stream an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RobotStream {
    Voxels,
    Tcps,
    Joints,
}

impl fmt::Display for RobotStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RobotStream::Voxels => "voxels",
            RobotStream::Tcps => "tcps",
            RobotStream::Joints => "joints",
        };
        f.write_str(name)
    }
}

/// Decoded robot stream event
#[derive(Debug, Clone, PartialEq)]
pub enum RobotEvent {
    Voxels(VoxelData),
    Tcps(Vec<Vec3>),
    Joints(Vec<JointsSynced>),
    Visibility(RobotStream, VisualChange),
}

/// Robot event tagged with the channel generation it arrived on
#[derive(Debug, Clone, PartialEq)]
pub struct RobotEnvelope {
    pub generation: Generation,
    pub event: RobotEvent,
}

/// Engine-side receiver of session events
///
/// All methods default to no-ops so observers implement only what they use.
pub trait EngineObserver: Send + Sync {
    /// An object was created or updated
    fn on_object_instance(&self, _visual: &ObjectVisual) {}

    fn on_object_deleted(&self, _id: &ObjectId) {}

    fn on_voxel_update(&self, _voxels: &VoxelData) {}

    fn on_tcp_update(&self, _tcps: &[Vec3]) {}

    fn on_joint_sync(&self, _samples: &[JointsSynced]) {}

    fn on_visibility_change(&self, _stream: RobotStream, _change: VisualChange) {}

    /// Emitted after every client is bound to the new channel
    fn on_channel_changed(&self, _target: &str) {}

    /// False once the engine destroyed the object on its own
    fn is_alive(&self, _id: &ObjectId) -> bool {
        true
    }
}

/// Fan-out over registered observers
#[derive(Clone, Default)]
pub struct ObserverList {
    observers: Vec<Arc<dyn EngineObserver>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Arc<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn channel_changed(&self, target: &str) {
        for observer in &self.observers {
            observer.on_channel_changed(target);
        }
    }

    pub fn dispatch_robot(&self, event: &RobotEvent) {
        for observer in &self.observers {
            match event {
                RobotEvent::Voxels(voxels) => observer.on_voxel_update(voxels),
                RobotEvent::Tcps(tcps) => observer.on_tcp_update(tcps),
                RobotEvent::Joints(samples) => observer.on_joint_sync(samples),
                RobotEvent::Visibility(stream, change) => {
                    observer.on_visibility_change(*stream, *change)
                }
            }
        }
    }
}

impl SceneSink for ObserverList {
    /// Dead as soon as any observer says so
    fn is_alive(&self, id: &ObjectId) -> bool {
        self.observers.iter().all(|o| o.is_alive(id))
    }

    fn on_object_instance(&mut self, visual: &ObjectVisual) {
        for observer in &self.observers {
            observer.on_object_instance(visual);
        }
    }

    fn on_object_deleted(&mut self, id: &ObjectId) {
        for observer in &self.observers {
            observer.on_object_deleted(id);
        }
    }
}

/// Scene changes recorded while the reconciler is locked
///
/// Liveness is answered from a set of ids the engine reported dead before
/// the lock was taken. [`SceneBuffer::replay`] hands the recorded changes to
/// the observers once the lock is gone.
#[derive(Debug, Default)]
pub(crate) struct SceneBuffer {
    dead: HashSet<ObjectId>,
    changes: Vec<SceneChange>,
}

#[derive(Debug)]
enum SceneChange {
    Instance(ObjectVisual),
    Deleted(ObjectId),
}

impl SceneBuffer {
    /// Ask `observers` which of `live` the engine still has
    pub(crate) fn with_liveness<'a>(
        observers: &ObserverList,
        live: impl IntoIterator<Item = &'a ObjectId>,
    ) -> Self {
        SceneBuffer {
            dead: live
                .into_iter()
                .filter(|id| !observers.is_alive(id))
                .cloned()
                .collect(),
            changes: Vec::new(),
        }
    }

    pub(crate) fn replay(self, observers: &mut ObserverList) {
        for change in self.changes {
            match change {
                SceneChange::Instance(visual) => observers.on_object_instance(&visual),
                SceneChange::Deleted(id) => observers.on_object_deleted(&id),
            }
        }
    }
}

impl SceneSink for SceneBuffer {
    fn is_alive(&self, id: &ObjectId) -> bool {
        !self.dead.contains(id)
    }

    fn on_object_instance(&mut self, visual: &ObjectVisual) {
        self.changes.push(SceneChange::Instance(visual.clone()));
    }

    fn on_object_deleted(&mut self, id: &ObjectId) {
        self.changes.push(SceneChange::Deleted(id.clone()));
    }
}

impl fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.observers.len())
            .finish()
    }
}
