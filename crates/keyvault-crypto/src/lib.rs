//! # KeyVault Crypto
//!
//! Cryptographic services for KeyVault including:
//! - AES-256-GCM sealing with random or caller-derived nonces
//! - HMAC-SHA256 sub-key and nonce derivation
//! - Zeroizing key buffers
//! - Master key providers (local, AWS, Azure, GCP, KMIP)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod encryption;
pub mod error;
pub mod hash;
pub mod key;
pub mod kms;

pub use encryption::*;
pub use error::*;
pub use hash::*;
pub use key::*;
pub use kms::*;
