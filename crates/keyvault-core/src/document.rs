//! Key vault documents.
//!
//! A [`KeyDocument`] holds one data encryption key (DEK) in wrapped form
//! together with the binding to the master key that wrapped it. The plaintext
//! DEK never appears in this type.

use crate::{KeyId, KeyVaultError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Provider-specific master key metadata (region, key ARN, resource id, ...).
pub type ProviderMetadata = BTreeMap<String, String>;

/// Master key providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KmsProvider {
    /// Locally supplied master key.
    Local,
    /// AWS KMS.
    Aws,
    /// Azure Key Vault.
    Azure,
    /// Google Cloud KMS.
    Gcp,
    /// KMIP-compliant key server.
    Kmip,
}

impl KmsProvider {
    /// All provider variants.
    pub const ALL: [Self; 5] = [Self::Local, Self::Aws, Self::Azure, Self::Gcp, Self::Kmip];

    /// Returns the provider name as stored in key documents.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
            Self::Kmip => "kmip",
        }
    }

    /// Returns true for providers that delegate to a remote KMS.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for KmsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KmsProvider {
    type Err = KeyVaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "aws" => Ok(Self::Aws),
            "azure" => Ok(Self::Azure),
            "gcp" => Ok(Self::Gcp),
            "kmip" => Ok(Self::Kmip),
            other => Err(KeyVaultError::InvalidRequest(format!(
                "unknown KMS provider '{other}' (expected local, aws, azure, gcp or kmip)"
            ))),
        }
    }
}

/// Binding between a data key and the master key that wraps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKey {
    /// Provider that must be used to unwrap the key material.
    pub provider: KmsProvider,
    /// Provider-specific metadata.
    #[serde(default)]
    pub metadata: ProviderMetadata,
}

impl MasterKey {
    /// Creates a binding for the given provider without metadata.
    #[must_use]
    pub fn new(provider: KmsProvider) -> Self {
        Self {
            provider,
            metadata: ProviderMetadata::new(),
        }
    }

    /// Creates a binding to the local master key.
    #[must_use]
    pub fn local() -> Self {
        Self::new(KmsProvider::Local)
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Status of a data key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyStatus {
    /// Used for new encryptions and for decryption.
    Active,
    /// Superseded by a rotation; still valid for decryption.
    Deprecated,
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Deprecated => f.write_str("deprecated"),
        }
    }
}

impl FromStr for KeyStatus {
    type Err = KeyVaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            other => Err(KeyVaultError::InvalidRequest(format!(
                "unknown key status '{other}'"
            ))),
        }
    }
}

/// A persisted data key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDocument {
    /// Immutable key id.
    #[serde(rename = "_id")]
    pub id: KeyId,
    /// DEK wrapped by the master key.
    #[serde(with = "base64_serde")]
    pub key_material: Vec<u8>,
    /// Creation time.
    pub creation_date: DateTime<Utc>,
    /// Last modification time; strictly increases on every update.
    pub update_date: DateTime<Utc>,
    /// Monotonic document version, starting at 1.
    #[serde(default = "default_version")]
    pub version: u64,
    /// Key status.
    pub status: KeyStatus,
    /// Master key binding.
    pub master_key: MasterKey,
    /// Human-readable aliases.
    #[serde(default)]
    pub key_alt_names: Vec<String>,
}

fn default_version() -> u64 {
    1
}

impl KeyDocument {
    /// Creates a new active key document.
    #[must_use]
    pub fn new(
        id: KeyId,
        key_material: Vec<u8>,
        master_key: MasterKey,
        key_alt_names: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            key_material,
            creation_date: now,
            update_date: now,
            version: 1,
            status: KeyStatus::Active,
            master_key,
            key_alt_names,
        }
    }

    /// Returns true if the key is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }

    /// Returns true if the document carries the given alternate name.
    #[must_use]
    pub fn has_alt_name(&self, name: &str) -> bool {
        self.key_alt_names.iter().any(|n| n == name)
    }
}

/// Reference to a data key by id or alternate name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyRef {
    /// By key id.
    Id(KeyId),
    /// By alternate name.
    AltName(String),
}

impl KeyRef {
    /// Creates an alternate-name reference.
    #[must_use]
    pub fn alt_name(name: impl Into<String>) -> Self {
        Self::AltName(name.into())
    }
}

impl From<KeyId> for KeyRef {
    fn from(id: KeyId) -> Self {
        Self::Id(id)
    }
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::AltName(name) => write!(f, "'{name}'"),
        }
    }
}

impl FromStr for KeyRef {
    type Err = KeyVaultError;

    /// Parses a UUID as an id reference; anything else is an alternate name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(KeyVaultError::InvalidRequest(
                "key reference must not be empty".to_string(),
            ));
        }
        Ok(s.parse::<KeyId>()
            .map_or_else(|_| Self::AltName(s.to_string()), Self::Id))
    }
}

/// Serde helpers encoding byte buffers as standard base64 strings.
pub mod base64_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes bytes as base64.
    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserializes bytes from base64.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
