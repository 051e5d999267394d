//! ARSYNC Transform Engine - Coordinate frame conversion
//!
//! The server declares how it encodes space (which of its axes point right,
//! forward and up, and a unit ratio). This crate turns such a declaration into
//! a converter into engine space:
//! - Frame declarations and validation
//! - Signed-permutation converter for points, sizes, indices, rotations and matrices
//! - Declare-once-per-stream converter cache

pub mod cache;
pub mod converter;
pub mod frame;

pub use cache::*;
pub use converter::*;
pub use frame::*;
