//! Field encryption algorithms.

use crate::KeyVaultError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Explicit encryption algorithm, chosen per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    /// Identical (key, plaintext) pairs give identical ciphertext.
    ///
    /// Supports equality queries and leaks equality patterns.
    #[serde(rename = "AEAD_AES_256_GCM_HMAC_SHA_256-Deterministic")]
    Deterministic,
    /// Fresh random nonce per call.
    #[serde(rename = "AEAD_AES_256_GCM_HMAC_SHA_256-Random")]
    Random,
}

impl EncryptionAlgorithm {
    /// Canonical algorithm name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Deterministic => "AEAD_AES_256_GCM_HMAC_SHA_256-Deterministic",
            Self::Random => "AEAD_AES_256_GCM_HMAC_SHA_256-Random",
        }
    }

    /// Wire tag of the current ciphertext format version.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Deterministic => 0x01,
            Self::Random => 0x02,
        }
    }

    /// Looks up an algorithm by wire tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::Deterministic),
            0x02 => Some(Self::Random),
            _ => None,
        }
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = KeyVaultError;

    /// Accepts the canonical name or the short forms `deterministic`/`random`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AEAD_AES_256_GCM_HMAC_SHA_256-Deterministic" => Ok(Self::Deterministic),
            "AEAD_AES_256_GCM_HMAC_SHA_256-Random" => Ok(Self::Random),
            _ => match s.to_lowercase().as_str() {
                "deterministic" | "det" => Ok(Self::Deterministic),
                "random" | "rand" => Ok(Self::Random),
                _ => Err(KeyVaultError::InvalidRequest(format!(
                    "unknown encryption algorithm '{s}'"
                ))),
            },
        }
    }
}
