//! Storage error types.

use keyvault_core::{KeyId, KeyVaultError};
use thiserror::Error;

/// Storage result type.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Document not found.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Document with the same id already exists.
    #[error("Document already exists: {0}")]
    AlreadyExists(KeyId),

    /// Alternate name held by another active document.
    #[error("Alt name already held by an active key: {0}")]
    AltNameConflict(String),

    /// Expected update date did not match.
    #[error("Document {0} was modified concurrently")]
    ConcurrentModification(KeyId),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend temporarily unavailable.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Internal error.
    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Returns true if the error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Unavailable(_) | Self::ConcurrentModification(_)
        )
    }

    /// Returns the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "STORAGE_NOT_FOUND",
            Self::AlreadyExists(_) => "STORAGE_ALREADY_EXISTS",
            Self::AltNameConflict(_) => "STORAGE_ALT_NAME_CONFLICT",
            Self::ConcurrentModification(_) => "STORAGE_CONCURRENT_MODIFICATION",
            Self::Io(_) => "STORAGE_IO_ERROR",
            Self::Serialization(_) => "STORAGE_SERIALIZATION_ERROR",
            Self::Unavailable(_) => "STORAGE_UNAVAILABLE",
            Self::Internal(_) => "STORAGE_INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<StorageError> for KeyVaultError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => Self::NotFound(what),
            StorageError::AlreadyExists(id) => Self::Conflict(format!("key {id} already exists")),
            StorageError::AltNameConflict(name) => Self::AltNameConflict(name),
            StorageError::ConcurrentModification(id) => Self::ConcurrentModification(id),
            StorageError::Io(_) | StorageError::Unavailable(_) => {
                Self::StorageUnavailable(err.to_string())
            }
            StorageError::Serialization(_) | StorageError::Internal(_) => {
                Self::Storage(err.to_string())
            }
        }
    }
}
