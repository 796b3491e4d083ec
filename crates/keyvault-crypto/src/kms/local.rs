//! Local master key provider.

use super::MasterKeyProvider;
use crate::{
    derive_key_argon2, AesGcmCipher, CryptoError, CryptoResult, EncryptedData, SecureBytes,
    AES_256_KEY_SIZE,
};
use async_trait::async_trait;
use keyvault_core::{KmsProvider, ProviderMetadata};

const WRAP_AAD: &[u8] = b"keyvault/local/v1";

/// Wraps data keys with AES-256-GCM under a master key held in process.
///
/// Output layout is `nonce(12) || ciphertext || tag(16)` with a fresh
/// nonce per call.
pub struct LocalMasterKeyProvider {
    master_key: SecureBytes,
    cipher: AesGcmCipher,
}

impl LocalMasterKeyProvider {
    /// Creates a provider from a 32-byte master key.
    pub fn new(master_key: SecureBytes) -> CryptoResult<Self> {
        if master_key.len() != AES_256_KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "local master key must be {} bytes, got {}",
                AES_256_KEY_SIZE,
                master_key.len()
            )));
        }
        Ok(Self {
            master_key,
            cipher: AesGcmCipher::new(),
        })
    }

    /// Derives the master key from a passphrase with Argon2id.
    pub fn from_passphrase(passphrase: &str, salt: &[u8]) -> CryptoResult<Self> {
        if passphrase.is_empty() {
            return Err(CryptoError::InvalidKey("passphrase must not be empty".to_string()));
        }
        let key = derive_key_argon2(passphrase.as_bytes(), salt, AES_256_KEY_SIZE)?;
        Self::new(key)
    }

    /// Creates a provider with a random master key.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            master_key: SecureBytes::random(AES_256_KEY_SIZE),
            cipher: AesGcmCipher::new(),
        }
    }
}

impl std::fmt::Debug for LocalMasterKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMasterKeyProvider")
            .field("master_key", &self.master_key)
            .finish()
    }
}

#[async_trait]
impl MasterKeyProvider for LocalMasterKeyProvider {
    fn kind(&self) -> KmsProvider {
        KmsProvider::Local
    }

    async fn wrap(
        &self,
        plaintext: &SecureBytes,
        _metadata: &ProviderMetadata,
    ) -> CryptoResult<Vec<u8>> {
        let sealed = self.cipher.encrypt(&self.master_key, plaintext.as_slice(), WRAP_AAD)?;
        Ok(sealed.to_bytes())
    }

    async fn unwrap(
        &self,
        ciphertext: &[u8],
        _metadata: &ProviderMetadata,
    ) -> CryptoResult<SecureBytes> {
        let sealed = EncryptedData::from_bytes(ciphertext)?;
        self.cipher.decrypt(&self.master_key, &sealed, WRAP_AAD)
    }
}
