//! # KeyVault Engine
//!
//! Data key lifecycle and explicit field encryption:
//! - [`KeyManager`]: create, rotate, rewrap, delete and resolve data keys
//! - [`EncryptionEngine`]: deterministic and randomized encryption of typed
//!   scalar values into a self-describing ciphertext
//! - [`DocumentEncryptor`]: field encryption of JSON documents by path
//! - [`SecretService`]: blue/green secret storage with master key rotation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod ciphertext;
pub mod config;
pub mod document;
pub mod engine;
pub mod manager;
pub mod secrets;

pub use cache::{CacheStats, KeyCache};
pub use config::{CacheConfig, DeletePolicy, ManagerConfig, Timeouts};
pub use document::DocumentEncryptor;
pub use engine::{EncryptionEngine, EncryptionRequest, FieldPolicy};
pub use manager::{CreateKeyOptions, KeyManager, ReferenceChecker, ResolvedKey, RewrapSummary};
pub use secrets::{SecretReferenceChecker, SecretService, Slot, SlotInfo, VaultInfo, DATA_KEY_ALT_NAME};
