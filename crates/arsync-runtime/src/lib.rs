//! ARSYNC Runtime - Session and domain clients
//!
//! This crate ties the lower layers together:
//! - Domain clients for objects, assets, selection, robot, hands and point clouds
//! - The session: channel changes, resubscription and the per-tick step
//! - Engine observers
//! - Configuration and tracing setup

pub mod clients;
pub mod config;
pub mod logging;
pub mod observer;
pub mod session;

pub use config::*;
pub use logging::*;
pub use observer::*;
pub use session::*;
