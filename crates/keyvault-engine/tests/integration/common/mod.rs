//! Common test utilities and fixtures.

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
