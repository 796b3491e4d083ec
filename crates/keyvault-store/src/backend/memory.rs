//! In-memory key vault store.

use super::{check_alt_names, select_by_alt_name, KeyCursor, KeyFilter, KeyMutation, KeyVaultStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use keyvault_core::{KeyDocument, KeyId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory key vault store.
///
/// All checks and writes for a mutation happen under one write lock.
#[derive(Debug, Default)]
pub struct InMemoryKeyVaultStore {
    docs: RwLock<HashMap<KeyId, KeyDocument>>,
}

impl InMemoryKeyVaultStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

#[async_trait]
impl KeyVaultStore for InMemoryKeyVaultStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, doc: KeyDocument) -> StorageResult<KeyId> {
        let mut docs = self.docs.write();
        if docs.contains_key(&doc.id) {
            return Err(StorageError::AlreadyExists(doc.id));
        }
        check_alt_names(&doc, docs.values())?;
        let id = doc.id;
        docs.insert(id, doc);
        Ok(id)
    }

    async fn find_by_id(&self, id: KeyId) -> StorageResult<Option<KeyDocument>> {
        Ok(self.docs.read().get(&id).cloned())
    }

    async fn find_by_alt_name(&self, name: &str) -> StorageResult<Option<KeyDocument>> {
        Ok(select_by_alt_name(self.docs.read().values(), name))
    }

    async fn find_all(&self, filter: &KeyFilter) -> StorageResult<KeyCursor> {
        let docs = self
            .docs
            .read()
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        Ok(KeyCursor::new(docs))
    }

    async fn update(&self, id: KeyId, mutation: KeyMutation) -> StorageResult<KeyDocument> {
        let mut docs = self.docs.write();
        let current = docs
            .get(&id)
            .ok_or_else(|| StorageError::NotFound(format!("key {id}")))?;
        let next = mutation.apply(current)?;
        check_alt_names(&next, docs.values())?;
        docs.insert(id, next.clone());
        Ok(next)
    }

    async fn delete(&self, id: KeyId) -> StorageResult<u64> {
        Ok(u64::from(self.docs.write().remove(&id).is_some()))
    }
}
