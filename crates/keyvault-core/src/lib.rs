//! # KeyVault Core
//!
//! Shared domain types for the KeyVault workspace:
//! - Key documents and their master-key binding
//! - Key references (id or alternate name)
//! - Encryption algorithms and typed field values
//! - The error taxonomy shared by every crate

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod algorithm;
pub mod color;
pub mod document;
pub mod error;
pub mod id;
pub mod value;

pub use algorithm::EncryptionAlgorithm;
pub use color::Color;
pub use document::{KeyDocument, KeyRef, KeyStatus, KmsProvider, MasterKey, ProviderMetadata};
pub use error::{ErrorCode, KeyVaultError, KeyVaultResult};
pub use id::KeyId;
pub use value::{FieldValue, ValueType};
