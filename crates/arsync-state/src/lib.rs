//! ARSYNC State - Update queue and reconciliation
//!
//! This crate implements the consumer side of object synchronization:
//! - The thread-safe update queue filled by background stream workers
//! - The shared prototype and mesh cache
//! - Visual resolution of instances against the cache
//! - The once-per-tick reconciliation step with its delete-wins batch rule

pub mod cache;
pub mod queue;
pub mod reconcile;
pub mod visual;

pub use cache::*;
pub use queue::*;
pub use reconcile::*;
pub use visual::*;
