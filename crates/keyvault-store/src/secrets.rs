//! Blue/green secret storage.
//!
//! Secrets are kept as ciphertext, one collection per [`Color`], next to a
//! single metadata record naming the active color.

use crate::backend::filesystem::write_atomic;
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use keyvault_core::document::base64_serde;
use keyvault_core::Color;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;

/// One encrypted secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    /// Caller-chosen secret id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Ciphertext produced by the encryption engine.
    #[serde(with = "base64_serde")]
    pub ciphertext: Vec<u8>,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

impl SecretRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, ciphertext: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            ciphertext,
            updated_at: Utc::now(),
        }
    }
}

/// Storage for encrypted secrets partitioned by color.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Inserts or replaces a secret in one color.
    async fn upsert(&self, color: Color, record: SecretRecord) -> StorageResult<()>;

    /// Reads a secret from one color.
    async fn get(&self, color: Color, id: &str) -> StorageResult<Option<SecretRecord>>;

    /// Lists every secret in one color, ordered by id.
    async fn list(&self, color: Color) -> StorageResult<Vec<SecretRecord>>;

    /// Drops every secret in one color, returning how many were removed.
    async fn clear(&self, color: Color) -> StorageResult<u64>;

    /// Returns the active color, if one was ever set.
    async fn active_color(&self) -> StorageResult<Option<Color>>;

    /// Records the active color.
    async fn set_active_color(&self, color: Color) -> StorageResult<()>;
}

/// In-memory secret store.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<Color, BTreeMap<String, SecretRecord>>>,
    active: RwLock<Option<Color>>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn upsert(&self, color: Color, record: SecretRecord) -> StorageResult<()> {
        self.secrets
            .write()
            .entry(color)
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, color: Color, id: &str) -> StorageResult<Option<SecretRecord>> {
        Ok(self
            .secrets
            .read()
            .get(&color)
            .and_then(|m| m.get(id))
            .cloned())
    }

    async fn list(&self, color: Color) -> StorageResult<Vec<SecretRecord>> {
        Ok(self
            .secrets
            .read()
            .get(&color)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, color: Color) -> StorageResult<u64> {
        let removed = self.secrets.write().remove(&color).map_or(0, |m| m.len());
        Ok(removed as u64)
    }

    async fn active_color(&self) -> StorageResult<Option<Color>> {
        Ok(*self.active.read())
    }

    async fn set_active_color(&self, color: Color) -> StorageResult<()> {
        *self.active.write() = Some(color);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SecretMetadata {
    active: Option<Color>,
}

/// Filesystem secret store.
///
/// Layout: `root/<color>/<base64url(id)>.json` plus `root/metadata.json`.
#[derive(Debug)]
pub struct FilesystemSecretStore {
    root: PathBuf,
}

impl FilesystemSecretStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn color_dir(&self, color: Color) -> PathBuf {
        self.root.join(color.as_str())
    }

    fn secret_path(&self, color: Color, id: &str) -> PathBuf {
        self.color_dir(color)
            .join(format!("{}.json", URL_SAFE_NO_PAD.encode(id.as_bytes())))
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    async fn secret_files(&self, color: Color) -> StorageResult<Vec<PathBuf>> {
        let dir = self.color_dir(color);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |e| e == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl SecretStore for FilesystemSecretStore {
    async fn upsert(&self, color: Color, record: SecretRecord) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(&record)?;
        write_atomic(&self.secret_path(color, &record.id), &bytes).await
    }

    async fn get(&self, color: Color, id: &str) -> StorageResult<Option<SecretRecord>> {
        match fs::read(self.secret_path(color, id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, color: Color) -> StorageResult<Vec<SecretRecord>> {
        let mut records = Vec::new();
        for path in self.secret_files(color).await? {
            let bytes = fs::read(&path).await?;
            records.push(serde_json::from_slice::<SecretRecord>(&bytes)?);
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn clear(&self, color: Color) -> StorageResult<u64> {
        let mut removed = 0;
        for path in self.secret_files(color).await? {
            fs::remove_file(&path).await?;
            removed += 1;
        }
        Ok(removed)
    }

    async fn active_color(&self) -> StorageResult<Option<Color>> {
        match fs::read(self.metadata_path()).await {
            Ok(bytes) => {
                let metadata: SecretMetadata = serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(metadata.active)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_active_color(&self, color: Color) -> StorageResult<()> {
        let metadata = SecretMetadata {
            active: Some(color),
        };
        write_atomic(&self.metadata_path(), &serde_json::to_vec_pretty(&metadata)?).await
    }
}
