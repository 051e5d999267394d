//! ARSYNC Wire Protocol - Records and codec
//!
//! This crate holds the protocol records exchanged with the workspace server
//! (already deserialized by the transport) and the pure functions mapping
//! them to and from the engine-space domain model:
//! - Wire records and enum values
//! - Frame-aware decoding (identity fallback when no frame is declared)
//! - Encoding of outgoing selection, hand tracking and point-cloud records

pub mod decode;
pub mod encode;
pub mod messages;

pub use decode::*;
pub use encode::*;
pub use messages::*;
