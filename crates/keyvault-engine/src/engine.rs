//! Explicit encryption of typed scalar values.

use crate::ciphertext::{self, Ciphertext, Header};
use crate::manager::{KeyManager, ResolvedKey};
use keyvault_core::{
    EncryptionAlgorithm, FieldValue, KeyId, KeyRef, KeyStatus, KeyVaultError, KeyVaultResult,
};
use keyvault_crypto::{
    derive_subkey, hmac_sha256_parts, random_nonce, AesGcmCipher, CryptoError, SecureBytes,
    AES_GCM_NONCE_SIZE,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

const ENCRYPTION_KEY_LABEL: &[u8] = b"keyvault/v1/encryption";
const NONCE_KEY_LABEL: &[u8] = b"keyvault/v1/nonce";

/// A value to encrypt, the key to encrypt it under and the algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionRequest {
    /// Data key, by id or alternate name.
    pub key: KeyRef,
    /// Algorithm; there is no default.
    pub algorithm: EncryptionAlgorithm,
    /// Plaintext value.
    pub value: FieldValue,
}

impl EncryptionRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(
        key: impl Into<KeyRef>,
        algorithm: EncryptionAlgorithm,
        value: impl Into<FieldValue>,
    ) -> Self {
        Self {
            key: key.into(),
            algorithm,
            value: value.into(),
        }
    }
}

/// Pins the algorithm used for named fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPolicy {
    fields: HashMap<String, EncryptionAlgorithm>,
}

impl FieldPolicy {
    /// Creates an empty policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `field` to `algorithm`.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, algorithm: EncryptionAlgorithm) -> Self {
        self.fields.insert(field.into(), algorithm);
        self
    }

    /// Returns the algorithm pinned for `field`.
    #[must_use]
    pub fn algorithm_for(&self, field: &str) -> Option<EncryptionAlgorithm> {
        self.fields.get(field).copied()
    }

    /// Fails if `field` is pinned to a different algorithm.
    pub fn check(&self, field: &str, algorithm: EncryptionAlgorithm) -> KeyVaultResult<()> {
        match self.algorithm_for(field) {
            Some(pinned) if pinned != algorithm => Err(KeyVaultError::InvalidRequest(format!(
                "field '{field}' must be encrypted with {pinned}, not {algorithm}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Encrypts and decrypts typed values under data keys from a [`KeyManager`].
///
/// Each data key yields two sub-keys via HMAC-SHA256: one for AES-256-GCM
/// and one for deriving deterministic nonces. A deterministic nonce is the
/// first 12 bytes of `HMAC(nonce_key, header || plaintext)`, so equal values
/// under the same key and type produce identical ciphertexts.
pub struct EncryptionEngine {
    keys: Arc<KeyManager>,
    cipher: AesGcmCipher,
    policy: FieldPolicy,
}

struct SubKeys {
    encryption: SecureBytes,
    nonce: SecureBytes,
}

impl SubKeys {
    fn derive(key: &ResolvedKey) -> Self {
        Self {
            encryption: derive_subkey(key.dek(), ENCRYPTION_KEY_LABEL),
            nonce: derive_subkey(key.dek(), NONCE_KEY_LABEL),
        }
    }
}

impl EncryptionEngine {
    /// Creates an engine without field policy.
    #[must_use]
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self {
            keys,
            cipher: AesGcmCipher::new(),
            policy: FieldPolicy::default(),
        }
    }

    /// Sets the field policy enforced by [`Self::encrypt_field`].
    #[must_use]
    pub fn with_policy(mut self, policy: FieldPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the key manager.
    #[must_use]
    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Returns the field policy.
    #[must_use]
    pub fn policy(&self) -> &FieldPolicy {
        &self.policy
    }

    /// Encrypts a value.
    ///
    /// Only active keys accept new encryptions; a deprecated key is kept for
    /// decrypting the values already written under it.
    pub async fn encrypt(&self, request: &EncryptionRequest) -> KeyVaultResult<Vec<u8>> {
        let value_type = request.value.value_type();
        if request.algorithm == EncryptionAlgorithm::Deterministic
            && !value_type.supports_deterministic()
        {
            return Err(KeyVaultError::InvalidRequest(format!(
                "{value_type} values cannot be encrypted deterministically"
            )));
        }

        let key = self
            .keys
            .resolve_key(&request.key)
            .await?
            .with_algorithm_hint(request.algorithm);
        if key.status() == KeyStatus::Deprecated {
            return Err(KeyVaultError::InvalidState(format!(
                "key {} is deprecated; encrypt under its active successor",
                key.id()
            )));
        }
        self.seal(&key, &request.value)
    }

    /// Encrypts a value stored in `field`, enforcing the field policy.
    pub async fn encrypt_field(
        &self,
        field: &str,
        request: &EncryptionRequest,
    ) -> KeyVaultResult<Vec<u8>> {
        self.policy.check(field, request.algorithm)?;
        self.encrypt(request).await
    }

    /// Decrypts a ciphertext produced by [`Self::encrypt`].
    pub async fn decrypt(&self, bytes: &[u8]) -> KeyVaultResult<FieldValue> {
        let parsed = Ciphertext::parse(bytes)?;
        let key_id = parsed.header.key_id;

        let key = match self.keys.resolve_key(&KeyRef::Id(key_id)).await {
            Ok(key) => key.with_algorithm_hint(parsed.header.algorithm),
            Err(KeyVaultError::KeyNotFound(_)) => return Err(KeyVaultError::UnknownKey(key_id)),
            Err(e) => return Err(e),
        };

        let sub_keys = SubKeys::derive(&key);
        let plaintext = self
            .cipher
            .open(
                &sub_keys.encryption,
                &parsed.nonce,
                parsed.payload,
                &parsed.header.to_bytes(),
            )
            .map_err(|e| {
                if matches!(e, CryptoError::AuthenticationFailed) {
                    warn!(key_id = %key_id, "Ciphertext failed authentication");
                }
                KeyVaultError::from(e)
            })?;

        FieldValue::from_bytes(parsed.header.value_type()?, plaintext.as_slice())
    }

    /// Returns the data key id embedded in a ciphertext.
    pub fn key_id_of(&self, bytes: &[u8]) -> KeyVaultResult<KeyId> {
        ciphertext::key_id_of(bytes)
    }

    fn seal(&self, key: &ResolvedKey, value: &FieldValue) -> KeyVaultResult<Vec<u8>> {
        let algorithm = key.algorithm_hint().ok_or_else(|| {
            KeyVaultError::InvalidRequest("an encryption algorithm must be chosen".to_string())
        })?;
        let header = Header::new(algorithm, key.id(), value.value_type());
        let aad = header.to_bytes();
        let plaintext = SecureBytes::new(value.to_bytes());
        let sub_keys = SubKeys::derive(key);

        let nonce = match algorithm {
            EncryptionAlgorithm::Deterministic => {
                let mac =
                    hmac_sha256_parts(sub_keys.nonce.as_slice(), &[aad.as_slice(), plaintext.as_slice()]);
                let mut nonce = [0u8; AES_GCM_NONCE_SIZE];
                nonce.copy_from_slice(&mac[..AES_GCM_NONCE_SIZE]);
                nonce
            }
            EncryptionAlgorithm::Random => random_nonce(),
        };

        let sealed = self
            .cipher
            .seal(&sub_keys.encryption, &nonce, plaintext.as_slice(), &aad)?;
        Ok(ciphertext::encode(&header, &nonce, &sealed))
    }
}

impl std::fmt::Debug for EncryptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionEngine")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
