//! Error taxonomy shared across KeyVault crates.
//!
//! Every failure that crosses the core boundary is a [`KeyVaultError`], which
//! distinguishes retryable from fatal conditions so callers can implement
//! retry and backoff uniformly. Messages never contain key material.

use crate::KeyId;
use std::fmt;
use thiserror::Error;

/// Result type alias using `KeyVaultError`.
pub type KeyVaultResult<T> = Result<T, KeyVaultError>;

/// Main error type for key lifecycle and value encryption operations.
#[derive(Debug, Error)]
pub enum KeyVaultError {
    /// Duplicate key id.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Alternate name already held by another active key.
    #[error("key alt name already in use: {0}")]
    AltNameConflict(String),

    /// Generic resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Data key not found.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Ciphertext references a key that cannot be resolved.
    #[error("ciphertext references unknown key {0}")]
    UnknownKey(KeyId),

    /// Deletion refused because known ciphertexts still reference the key.
    #[error("key {id} is still referenced by {references} ciphertext(s)")]
    KeyInUse {
        /// The key id.
        id: KeyId,
        /// Number of known references.
        references: u64,
    },

    /// Operation not valid in the key's current state.
    #[error("invalid key state: {0}")]
    InvalidState(String),

    /// Master key provider temporarily unavailable.
    #[error("master key provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Master key provider rejected the credentials.
    #[error("master key provider authentication failed: {0}")]
    ProviderAuthFailure(String),

    /// No provider registered for the document's provider tag.
    #[error("no master key provider configured for '{0}'")]
    ProviderNotConfigured(String),

    /// A store or provider call exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// AEAD tag verification failed.
    #[error("authentication failed: ciphertext was tampered with or the wrong key was used")]
    AuthenticationFailure,

    /// Key document changed between read and rewrap commit.
    #[error("key {0} was modified concurrently during rewrap")]
    RewrapConflict(KeyId),

    /// Key document changed between read and commit.
    #[error("key {0} was modified concurrently")]
    ConcurrentModification(KeyId),

    /// Malformed ciphertext.
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Unknown ciphertext algorithm tag.
    #[error("unsupported algorithm tag 0x{0:02x}")]
    UnsupportedAlgorithm(u8),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Store temporarily unavailable.
    #[error("key vault store unavailable: {0}")]
    StorageUnavailable(String),

    /// Store failure.
    #[error("key vault store error: {0}")]
    Storage(String),

    /// Cryptographic failure other than tag verification.
    #[error("cryptographic error: {0}")]
    Crypto(String),
}

impl KeyVaultError {
    /// Returns true if the operation may succeed when retried (after re-read
    /// for concurrency conflicts, with backoff otherwise).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_)
                | Self::Timeout(_)
                | Self::RewrapConflict(_)
                | Self::ConcurrentModification(_)
                | Self::StorageUnavailable(_)
        )
    }

    /// Returns true for failures that must be treated as a security incident.
    #[must_use]
    pub const fn is_security_incident(&self) -> bool {
        matches!(self, Self::AuthenticationFailure)
    }

    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Conflict(_) => ErrorCode::new(1001),
            Self::AltNameConflict(_) => ErrorCode::new(1002),
            Self::NotFound(_) => ErrorCode::new(2001),
            Self::KeyNotFound(_) => ErrorCode::new(2002),
            Self::UnknownKey(_) => ErrorCode::new(2003),
            Self::KeyInUse { .. } => ErrorCode::new(3001),
            Self::InvalidState(_) => ErrorCode::new(3002),
            Self::RewrapConflict(_) => ErrorCode::new(3003),
            Self::ConcurrentModification(_) => ErrorCode::new(3004),
            Self::ProviderUnavailable(_) => ErrorCode::new(4001),
            Self::ProviderAuthFailure(_) => ErrorCode::new(4002),
            Self::ProviderNotConfigured(_) => ErrorCode::new(4003),
            Self::Timeout(_) => ErrorCode::new(4004),
            Self::AuthenticationFailure => ErrorCode::new(5001),
            Self::InvalidCiphertext(_) => ErrorCode::new(5002),
            Self::UnsupportedAlgorithm(_) => ErrorCode::new(5003),
            Self::Crypto(_) => ErrorCode::new(5004),
            Self::InvalidRequest(_) => ErrorCode::new(6001),
            Self::StorageUnavailable(_) => ErrorCode::new(7001),
            Self::Storage(_) => ErrorCode::new(7002),
        }
    }
}

/// Numeric error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(u16);

impl ErrorCode {
    /// Creates a new error code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KEYVAULT_{:04}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::new(4002).to_string(), "KEYVAULT_4002");
    }

    #[test]
    fn test_retryable_classification() {
        let id = KeyId::new();
        assert!(KeyVaultError::ProviderUnavailable("kms down".into()).is_retryable());
        assert!(KeyVaultError::Timeout("unwrap".into()).is_retryable());
        assert!(KeyVaultError::RewrapConflict(id).is_retryable());

        assert!(!KeyVaultError::ProviderAuthFailure("bad creds".into()).is_retryable());
        assert!(!KeyVaultError::AuthenticationFailure.is_retryable());
        assert!(!KeyVaultError::AltNameConflict("dek".into()).is_retryable());
        assert!(KeyVaultError::AuthenticationFailure.is_security_incident());
    }
}
