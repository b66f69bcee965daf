//! Testing utilities for mock_kafka
//!
//! Only compiled when running tests.
//!
//! # Organization
//! - `helpers.rs` - store fixtures and request builders

#![cfg(test)]

pub mod helpers;

pub use helpers::*;
