//! Secure key buffers with zeroization.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of AES-256 keys (and data encryption keys) in bytes.
pub const AES_256_KEY_SIZE: usize = 32;

/// Size of AES-GCM nonces in bytes.
pub const AES_GCM_NONCE_SIZE: usize = 12;

/// Size of AES-GCM authentication tags in bytes.
pub const AES_GCM_TAG_SIZE: usize = 16;

/// Secure bytes that are zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes(Vec<u8>);

impl SecureBytes {
    /// Creates new secure bytes, taking ownership of the buffer.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Creates secure bytes from a slice.
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    /// Generates `len` bytes from the thread-local CSPRNG.
    #[must_use]
    pub fn random(len: usize) -> Self {
        Self(crate::random_bytes(len))
    }

    /// Returns the bytes as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBytes([REDACTED, {} bytes])", self.0.len())
    }
}

impl AsRef<[u8]> for SecureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for SecureBytes {
    fn eq(&self, other: &Self) -> bool {
        crate::constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for SecureBytes {}
