//! Storage backends for KeyVault.
//!
//! This crate provides the key vault store (one document per data key) and
//! the blue/green secret store, each with in-memory and filesystem backends.

pub mod backend;
pub mod error;
pub mod secrets;

pub use backend::{KeyCursor, KeyFilter, KeyMutation, KeyVaultStore};
pub use error::{StorageError, StorageResult};
pub use secrets::{FilesystemSecretStore, InMemorySecretStore, SecretRecord, SecretStore};

// Re-export backends
pub use backend::filesystem::FilesystemKeyVaultStore;
pub use backend::memory::InMemoryKeyVaultStore;
