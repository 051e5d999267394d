//! ARSYNC Transport Layer - Channel and streaming subscriptions
//!
//! This crate provides:
//! - RPC status codes and server/client stream abstractions
//! - Service traits for every remote API the client uses
//! - The channel and its connection state machine
//! - The streaming subscription runner

pub mod channel;
pub mod rpc;
pub mod runner;
pub mod services;

pub use channel::*;
pub use rpc::*;
pub use runner::*;
pub use services::*;
