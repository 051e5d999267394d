//! Domain clients
//!
//! Each client wraps one remote service of the current channel. Clients are
//! rebound on every channel change; everything a background worker delivers
//! passes the generation gate first, so messages from a previous channel
//! never reach the queue or the asset cache.

pub mod hand_tracking;
pub mod mesh;
pub mod object;
pub mod point_cloud;
pub mod robot;
pub mod selection;

pub use hand_tracking::*;
pub use mesh::*;
pub use object::*;
pub use point_cloud::*;
pub use robot::*;
pub use selection::*;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arsync_core::Generation;
use arsync_state::{AssetCache, UpdateQueue};
use arsync_transport::GenerationCounter;
use parking_lot::{RwLock, RwLockWriteGuard};
use tokio::sync::mpsc;

use crate::RobotEnvelope;

/// State shared by the session and every client
#[derive(Clone)]
pub struct ClientContext {
    pub generations: GenerationCounter,
    pub queue: Arc<UpdateQueue>,
    pub assets: Arc<AssetCache>,
    pub robot_tx: mpsc::Sender<RobotEnvelope>,
    /// Messages discarded because their channel was replaced
    pub stray: Arc<AtomicU64>,
    gate: Arc<RwLock<()>>,
}

impl ClientContext {
    pub fn new(robot_tx: mpsc::Sender<RobotEnvelope>) -> Self {
        ClientContext {
            generations: GenerationCounter::new(),
            queue: Arc::new(UpdateQueue::new()),
            assets: Arc::new(AssetCache::new()),
            robot_tx,
            stray: Arc::new(AtomicU64::new(0)),
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// Run `apply` only if `generation` is still current
    ///
    /// Holds the gate for reading, so a concurrent channel switch either
    /// happens before the check or after `apply` returned.
    pub fn deliver(&self, generation: Generation, stream: &'static str, apply: impl FnOnce()) -> bool {
        let _gate = self.gate.read();
        if self.generations.is_current(generation) {
            apply();
            true
        } else {
            self.stray.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(stream, ?generation, "discarding message from a replaced channel");
            false
        }
    }

    /// Exclusive access while switching generations
    pub fn lock_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write()
    }

    pub fn stray_messages(&self) -> u64 {
        self.stray.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliver_checks_generation() {
        let (tx, _rx) = mpsc::channel(4);
        let ctx = ClientContext::new(tx);
        let first = ctx.generations.advance();

        let mut applied = 0;
        assert!(ctx.deliver(first, "test", || applied += 1));

        {
            let _gate = ctx.lock_gate();
            ctx.generations.advance();
        }
        assert!(!ctx.deliver(first, "test", || applied += 1));
        assert_eq!(applied, 1);
        assert_eq!(ctx.stray_messages(), 1);
    }
}
