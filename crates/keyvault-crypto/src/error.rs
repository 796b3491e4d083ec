//! Cryptographic error types.

use keyvault_core::{KeyVaultError, KmsProvider};
use thiserror::Error;

/// Cryptographic errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Invalid key.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Master key not found at the provider.
    #[error("master key not found: {0}")]
    KeyNotFound(String),

    /// Key generation or derivation failed.
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Invalid ciphertext.
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Authentication failed (AEAD tag mismatch).
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Provider temporarily unavailable.
    #[error("{provider} provider unavailable: {message}")]
    ProviderUnavailable {
        /// Provider.
        provider: KmsProvider,
        /// Detail.
        message: String,
    },

    /// Provider rejected the credentials.
    #[error("{provider} provider authentication failed: {message}")]
    ProviderAuthFailure {
        /// Provider.
        provider: KmsProvider,
        /// Detail.
        message: String,
    },

    /// No provider registered for a tag.
    #[error("no master key provider configured for '{0}'")]
    ProviderNotConfigured(KmsProvider),

    /// Required master key metadata missing.
    #[error("{provider} master key metadata is missing '{field}'")]
    InvalidMetadata {
        /// Provider.
        provider: KmsProvider,
        /// Missing field.
        field: String,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CryptoError {
    /// Returns true if the error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<aes_gcm::Error> for CryptoError {
    fn from(_: aes_gcm::Error) -> Self {
        Self::AuthenticationFailed
    }
}

impl From<CryptoError> for KeyVaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailed => Self::AuthenticationFailure,
            CryptoError::KeyNotFound(msg) => Self::KeyNotFound(msg),
            CryptoError::InvalidCiphertext(msg) => Self::InvalidCiphertext(msg),
            CryptoError::ProviderUnavailable { .. } => Self::ProviderUnavailable(err.to_string()),
            CryptoError::ProviderAuthFailure { .. } => Self::ProviderAuthFailure(err.to_string()),
            CryptoError::ProviderNotConfigured(provider) => {
                Self::ProviderNotConfigured(provider.to_string())
            }
            CryptoError::InvalidMetadata { .. } => Self::InvalidRequest(err.to_string()),
            CryptoError::EncryptionFailed(_)
            | CryptoError::InvalidKey(_)
            | CryptoError::KeyGenerationFailed(_)
            | CryptoError::Internal(_) => Self::Crypto(err.to_string()),
        }
    }
}
