//! Self-describing ciphertext layout.
//!
//! ```text
//! offset 0     algorithm tag   0x01 deterministic v1, 0x02 random v1
//! offset 1     key id          16 bytes
//! offset 17    value type tag  1 byte
//! offset 18    nonce           12 bytes
//! offset 30    AES-256-GCM ciphertext || 16-byte tag
//! ```
//!
//! Bytes `[0, 18)` are the associated data. A new layout must use a new
//! algorithm tag so existing ciphertexts stay readable.

use keyvault_core::{EncryptionAlgorithm, KeyId, KeyVaultError, KeyVaultResult, ValueType};
use keyvault_crypto::{AES_GCM_NONCE_SIZE, AES_GCM_TAG_SIZE};

/// Length of the authenticated header.
pub const HEADER_LEN: usize = 18;

/// Offset of the AEAD output.
pub const PAYLOAD_OFFSET: usize = HEADER_LEN + AES_GCM_NONCE_SIZE;

/// Smallest well-formed ciphertext (empty plaintext).
pub const MIN_LEN: usize = PAYLOAD_OFFSET + AES_GCM_TAG_SIZE;

/// Authenticated ciphertext header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Algorithm used to produce the ciphertext.
    pub algorithm: EncryptionAlgorithm,
    /// Data key id.
    pub key_id: KeyId,
    /// Raw value type tag, interpreted only after the tag verifies.
    pub value_type_tag: u8,
}

impl Header {
    /// Creates a header.
    #[must_use]
    pub fn new(algorithm: EncryptionAlgorithm, key_id: KeyId, value_type: ValueType) -> Self {
        Self {
            algorithm,
            key_id,
            value_type_tag: value_type.tag(),
        }
    }

    /// Encodes the header; this is also the AEAD associated data.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.algorithm.tag();
        out[1..17].copy_from_slice(self.key_id.as_bytes());
        out[17] = self.value_type_tag;
        out
    }

    /// Resolves the value type tag.
    pub fn value_type(&self) -> KeyVaultResult<ValueType> {
        ValueType::from_tag(self.value_type_tag).ok_or_else(|| {
            KeyVaultError::InvalidCiphertext(format!(
                "unknown value type tag 0x{:02x}",
                self.value_type_tag
            ))
        })
    }
}

/// A parsed ciphertext borrowing its payload.
#[derive(Debug, Clone, Copy)]
pub struct Ciphertext<'a> {
    /// Header.
    pub header: Header,
    /// AEAD nonce.
    pub nonce: [u8; AES_GCM_NONCE_SIZE],
    /// AEAD ciphertext followed by the tag.
    pub payload: &'a [u8],
}

impl<'a> Ciphertext<'a> {
    /// Parses `bytes`.
    ///
    /// An unknown algorithm tag fails with `UnsupportedAlgorithm` before any
    /// length check so future layouts are reported as such.
    pub fn parse(bytes: &'a [u8]) -> KeyVaultResult<Self> {
        let Some(&tag) = bytes.first() else {
            return Err(KeyVaultError::InvalidCiphertext("empty ciphertext".to_string()));
        };
        let algorithm =
            EncryptionAlgorithm::from_tag(tag).ok_or(KeyVaultError::UnsupportedAlgorithm(tag))?;

        if bytes.len() < MIN_LEN {
            return Err(KeyVaultError::InvalidCiphertext(format!(
                "expected at least {MIN_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let mut key_id = [0u8; 16];
        key_id.copy_from_slice(&bytes[1..17]);
        let mut nonce = [0u8; AES_GCM_NONCE_SIZE];
        nonce.copy_from_slice(&bytes[HEADER_LEN..PAYLOAD_OFFSET]);

        Ok(Self {
            header: Header {
                algorithm,
                key_id: KeyId::from_bytes(key_id),
                value_type_tag: bytes[17],
            },
            nonce,
            payload: &bytes[PAYLOAD_OFFSET..],
        })
    }
}

/// Assembles `header || nonce || sealed`.
#[must_use]
pub fn encode(header: &Header, nonce: &[u8; AES_GCM_NONCE_SIZE], sealed: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PAYLOAD_OFFSET + sealed.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(nonce);
    out.extend_from_slice(sealed);
    out
}

/// Reads the key id of a ciphertext without decrypting it.
pub fn key_id_of(bytes: &[u8]) -> KeyVaultResult<KeyId> {
    Ok(Ciphertext::parse(bytes)?.header.key_id)
}
