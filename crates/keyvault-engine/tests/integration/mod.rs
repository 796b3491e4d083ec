//! Integration tests for the KeyVault engine.
//!
//! Covers key lifecycle across backends, rewrap failure handling,
//! end-to-end field encryption and blue/green secret rotation.

pub mod common;
pub mod encryption;
pub mod lifecycle;
pub mod rewrap;
pub mod secrets;
