//! ARSYNC Test Harness - Mock server and end-to-end scenarios
//!
//! This crate provides:
//! - An in-memory server implementing every service trait
//! - A mock network resolving targets to servers
//! - A recording engine observer and polling helpers
//! - End-to-end scenarios against a real session

pub mod integration;
pub mod mock;

pub use integration::*;
pub use mock::*;
