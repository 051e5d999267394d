//! ARSYNC Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every layer of the AR sync client:
//! - Identifiers (ObjectId, Generation)
//! - Spatial math in engine space (Vec3, Quat, Transform, Aabb, Obb)
//! - The synchronized domain model (meshes, prototypes, instances, robot data)
//! - Error types

pub mod error;
pub mod id;
pub mod math;
pub mod model;

pub use error::*;
pub use id::*;
pub use math::*;
pub use model::*;
