//! AES-256-GCM encryption implementation.

use crate::{CryptoError, CryptoResult, SecureBytes, AES_256_KEY_SIZE, AES_GCM_NONCE_SIZE, AES_GCM_TAG_SIZE};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

/// Sealed data: a nonce and the AEAD output (ciphertext followed by tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    /// Nonce.
    pub nonce: [u8; AES_GCM_NONCE_SIZE],
    /// Ciphertext (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Returns the total size of the encrypted data.
    #[must_use]
    pub fn size(&self) -> usize {
        self.nonce.len() + self.ciphertext.len()
    }

    /// Serializes as `nonce || ciphertext || tag`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parses `nonce || ciphertext || tag`.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < AES_GCM_NONCE_SIZE + AES_GCM_TAG_SIZE {
            return Err(CryptoError::InvalidCiphertext(format!(
                "expected at least {} bytes, got {}",
                AES_GCM_NONCE_SIZE + AES_GCM_TAG_SIZE,
                bytes.len()
            )));
        }
        let (nonce, ciphertext) = bytes.split_at(AES_GCM_NONCE_SIZE);
        let mut nonce_bytes = [0u8; AES_GCM_NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);
        Ok(Self {
            nonce: nonce_bytes,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// AES-256-GCM cipher.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmCipher;

impl AesGcmCipher {
    /// Creates a new AES-256-GCM cipher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encrypts data under a fresh random nonce.
    pub fn encrypt(
        &self,
        key: &SecureBytes,
        plaintext: &[u8],
        aad: &[u8],
    ) -> CryptoResult<EncryptedData> {
        let nonce = random_nonce();
        let ciphertext = self.seal(key, &nonce, plaintext, aad)?;
        Ok(EncryptedData { nonce, ciphertext })
    }

    /// Decrypts sealed data.
    pub fn decrypt(
        &self,
        key: &SecureBytes,
        data: &EncryptedData,
        aad: &[u8],
    ) -> CryptoResult<SecureBytes> {
        self.open(key, &data.nonce, &data.ciphertext, aad)
    }

    /// Encrypts under an explicit nonce. The caller owns nonce uniqueness.
    pub fn seal(
        &self,
        key: &SecureBytes,
        nonce: &[u8; AES_GCM_NONCE_SIZE],
        plaintext: &[u8],
        aad: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let cipher = Self::cipher(key)?;
        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::EncryptionFailed("AEAD encryption failed".to_string()))
    }

    /// Decrypts and verifies `ciphertext || tag` under an explicit nonce.
    pub fn open(
        &self,
        key: &SecureBytes,
        nonce: &[u8; AES_GCM_NONCE_SIZE],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> CryptoResult<SecureBytes> {
        if ciphertext.len() < AES_GCM_TAG_SIZE {
            return Err(CryptoError::InvalidCiphertext(
                "ciphertext shorter than authentication tag".to_string(),
            ));
        }
        let cipher = Self::cipher(key)?;
        let plaintext = cipher.decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })?;
        Ok(SecureBytes::new(plaintext))
    }

    /// Generates a new random key.
    #[must_use]
    pub fn generate_key(&self) -> SecureBytes {
        SecureBytes::random(AES_256_KEY_SIZE)
    }

    fn cipher(key: &SecureBytes) -> CryptoResult<Aes256Gcm> {
        if key.len() != AES_256_KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "Expected {} bytes, got {}",
                AES_256_KEY_SIZE,
                key.len()
            )));
        }
        Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

/// Generates a random 96-bit nonce.
#[must_use]
pub fn random_nonce() -> [u8; AES_GCM_NONCE_SIZE] {
    let mut nonce = [0u8; AES_GCM_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}
