//! Filesystem key vault store.

use super::{check_alt_names, select_by_alt_name, KeyCursor, KeyFilter, KeyMutation, KeyVaultStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use fs4::fs_std::FileExt;
use keyvault_core::{KeyDocument, KeyId};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const LOCK_FILE: &str = ".lock";

/// Filesystem key vault store: one JSON document per key under `root`.
///
/// The read-check-write of every mutation runs under an exclusive advisory
/// lock on `<root>/.lock`, so processes sharing a vault directory are
/// serialized. Readers never observe a partial file because writes go to a
/// uniquely named temp file that is renamed into place.
#[derive(Debug)]
pub struct FilesystemKeyVaultStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

/// Exclusive lock on a vault directory, released when dropped.
struct VaultLock {
    _file: std::fs::File,
}

impl VaultLock {
    async fn acquire(root: &Path) -> StorageResult<Self> {
        let path = root.join(LOCK_FILE);
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| StorageError::Internal(format!("vault lock task failed: {e}")))??;
        Ok(Self { _file: file })
    }
}

impl FilesystemKeyVaultStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            fs::create_dir_all(&root).await?;
        }

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn doc_path(&self, id: KeyId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn read_doc(&self, path: &Path) -> StorageResult<Option<KeyDocument>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_all(&self) -> StorageResult<Vec<KeyDocument>> {
        let mut docs = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            // A concurrent delete may remove the file between listing and read.
            if let Some(doc) = self.read_doc(&path).await? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    async fn write_doc(&self, doc: &KeyDocument) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        write_atomic(&self.doc_path(doc.id), &bytes).await
    }

    async fn lock(&self) -> StorageResult<(tokio::sync::MutexGuard<'_, ()>, VaultLock)> {
        let guard = self.write_lock.lock().await;
        let vault = VaultLock::acquire(&self.root).await?;
        Ok((guard, vault))
    }
}

/// Writes `data` to a uniquely named temp file next to `path`, syncs it and
/// renames it into place.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).await?;

    let path = path.to_path_buf();
    let data = data.to_vec();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(&data)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| StorageError::Internal(format!("write task failed: {e}")))??;

    Ok(())
}

#[async_trait]
impl KeyVaultStore for FilesystemKeyVaultStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn insert(&self, doc: KeyDocument) -> StorageResult<KeyId> {
        let _lock = self.lock().await?;

        if fs::try_exists(self.doc_path(doc.id)).await? {
            return Err(StorageError::AlreadyExists(doc.id));
        }
        let existing = self.load_all().await?;
        check_alt_names(&doc, &existing)?;

        self.write_doc(&doc).await?;
        tracing::debug!(key_id = %doc.id, "Key document written");
        Ok(doc.id)
    }

    async fn find_by_id(&self, id: KeyId) -> StorageResult<Option<KeyDocument>> {
        self.read_doc(&self.doc_path(id)).await
    }

    async fn find_by_alt_name(&self, name: &str) -> StorageResult<Option<KeyDocument>> {
        let docs = self.load_all().await?;
        Ok(select_by_alt_name(&docs, name))
    }

    async fn find_all(&self, filter: &KeyFilter) -> StorageResult<KeyCursor> {
        let docs = self
            .load_all()
            .await?
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect();
        Ok(KeyCursor::new(docs))
    }

    async fn update(&self, id: KeyId, mutation: KeyMutation) -> StorageResult<KeyDocument> {
        let _lock = self.lock().await?;

        let current = self
            .read_doc(&self.doc_path(id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("key {id}")))?;
        let next = mutation.apply(&current)?;
        if next.is_active() && !next.key_alt_names.is_empty() {
            let existing = self.load_all().await?;
            check_alt_names(&next, &existing)?;
        }

        self.write_doc(&next).await?;
        Ok(next)
    }

    async fn delete(&self, id: KeyId) -> StorageResult<u64> {
        let _lock = self.lock().await?;

        match fs::remove_file(self.doc_path(id)).await {
            Ok(()) => Ok(1),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
