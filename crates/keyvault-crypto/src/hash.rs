//! Keyed hashing and key derivation utilities.

use crate::{CryptoError, CryptoResult, SecureBytes};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256.
#[must_use]
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    hmac_sha256_parts(key, &[data])
}

/// HMAC-SHA256 over the concatenation of `parts`.
#[must_use]
pub fn hmac_sha256_parts(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Derives a labelled 32-byte sub-key from a root key.
#[must_use]
pub fn derive_subkey(root: &SecureBytes, label: &[u8]) -> SecureBytes {
    SecureBytes::new(hmac_sha256(root.as_slice(), label).to_vec())
}

/// Derives a key using Argon2id.
pub fn derive_key_argon2(
    password: &[u8],
    salt: &[u8],
    output_len: usize,
) -> CryptoResult<SecureBytes> {
    use argon2::{Algorithm, Argon2, Params, Version};

    let params = Params::new(65536, 3, 4, Some(output_len))
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = vec![0u8; output_len];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;

    Ok(SecureBytes::new(output))
}

/// Generates random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Constant-time comparison.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
