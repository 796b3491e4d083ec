//! Key vault store trait and shared document rules.

pub mod filesystem;
pub mod memory;

use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use keyvault_core::{KeyDocument, KeyId, KeyStatus, KmsProvider, MasterKey};

/// Persistent collection of key documents.
///
/// Every operation is atomic with respect to a single document. Alternate
/// names are unique among `ACTIVE` documents; a deprecated document may keep
/// the name its successor now holds.
#[async_trait]
pub trait KeyVaultStore: Send + Sync {
    /// Returns the backend name.
    fn name(&self) -> &str;

    /// Inserts a new document.
    ///
    /// Fails with [`StorageError::AlreadyExists`] if the id is taken and
    /// [`StorageError::AltNameConflict`] if an alternate name is held by
    /// another active document.
    async fn insert(&self, doc: KeyDocument) -> StorageResult<KeyId>;

    /// Looks a document up by id.
    async fn find_by_id(&self, id: KeyId) -> StorageResult<Option<KeyDocument>>;

    /// Looks a document up by alternate name, preferring the active holder
    /// and falling back to the most recently updated deprecated holder.
    async fn find_by_alt_name(&self, name: &str) -> StorageResult<Option<KeyDocument>>;

    /// Returns every document matching `filter`, ordered by creation date.
    async fn find_all(&self, filter: &KeyFilter) -> StorageResult<KeyCursor>;

    /// Applies a mutation to one document and returns the result.
    async fn update(&self, id: KeyId, mutation: KeyMutation) -> StorageResult<KeyDocument>;

    /// Deletes a document, returning the number removed (0 or 1).
    async fn delete(&self, id: KeyId) -> StorageResult<u64>;

    /// Counts documents matching `filter`.
    async fn count(&self, filter: &KeyFilter) -> StorageResult<usize> {
        Ok(self.find_all(filter).await?.len())
    }
}

/// Selection criteria for [`KeyVaultStore::find_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFilter {
    /// Only documents in this status.
    pub status: Option<KeyStatus>,
    /// Only documents wrapped by this provider.
    pub provider: Option<KmsProvider>,
    /// Only documents carrying this alternate name.
    pub alt_name: Option<String>,
}

impl KeyFilter {
    /// Matches every document.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to a status.
    #[must_use]
    pub fn with_status(mut self, status: KeyStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to a provider.
    #[must_use]
    pub fn with_provider(mut self, provider: KmsProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Restricts to an alternate name.
    #[must_use]
    pub fn with_alt_name(mut self, name: impl Into<String>) -> Self {
        self.alt_name = Some(name.into());
        self
    }

    /// Returns true if `doc` satisfies the filter.
    #[must_use]
    pub fn matches(&self, doc: &KeyDocument) -> bool {
        self.status.map_or(true, |s| doc.status == s)
            && self.provider.map_or(true, |p| doc.master_key.provider == p)
            && self.alt_name.as_deref().map_or(true, |n| doc.has_alt_name(n))
    }
}

/// Finite, ordered result of [`KeyVaultStore::find_all`].
#[derive(Debug)]
pub struct KeyCursor {
    docs: std::vec::IntoIter<KeyDocument>,
}

impl KeyCursor {
    /// Builds a cursor, ordering documents by creation date then id.
    #[must_use]
    pub fn new(mut docs: Vec<KeyDocument>) -> Self {
        docs.sort_by(|a, b| {
            a.creation_date
                .cmp(&b.creation_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Self {
            docs: docs.into_iter(),
        }
    }

    /// Remaining documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Returns true if no documents remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.len() == 0
    }
}

impl Iterator for KeyCursor {
    type Item = KeyDocument;

    fn next(&mut self) -> Option<Self::Item> {
        self.docs.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.docs.size_hint()
    }
}

impl ExactSizeIterator for KeyCursor {}

/// A conditional change to one key document.
///
/// When `expected_update_date` is set the mutation only applies if the
/// stored document still carries that update date.
#[derive(Debug, Clone, Default)]
pub struct KeyMutation {
    /// Optimistic concurrency token.
    pub expected_update_date: Option<DateTime<Utc>>,
    /// New status.
    pub status: Option<KeyStatus>,
    /// New wrapped key material and master key binding.
    pub rewrap: Option<(Vec<u8>, MasterKey)>,
    /// Alternate names to add.
    pub add_alt_names: Vec<String>,
    /// Alternate names to remove.
    pub remove_alt_names: Vec<String>,
}

impl KeyMutation {
    /// Creates an unconditional, empty mutation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the mutation conditional on the stored update date.
    #[must_use]
    pub fn expect_update_date(mut self, update_date: DateTime<Utc>) -> Self {
        self.expected_update_date = Some(update_date);
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn set_status(mut self, status: KeyStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Replaces the wrapped key material and its master key binding.
    #[must_use]
    pub fn rewrap(mut self, key_material: Vec<u8>, master_key: MasterKey) -> Self {
        self.rewrap = Some((key_material, master_key));
        self
    }

    /// Adds an alternate name.
    #[must_use]
    pub fn add_alt_name(mut self, name: impl Into<String>) -> Self {
        self.add_alt_names.push(name.into());
        self
    }

    /// Removes an alternate name.
    #[must_use]
    pub fn remove_alt_name(mut self, name: impl Into<String>) -> Self {
        self.remove_alt_names.push(name.into());
        self
    }

    /// Applies the mutation to `current`, checking the concurrency token and
    /// bumping `update_date` and `version`.
    pub fn apply(&self, current: &KeyDocument) -> StorageResult<KeyDocument> {
        if let Some(expected) = self.expected_update_date {
            if expected != current.update_date {
                return Err(StorageError::ConcurrentModification(current.id));
            }
        }

        let mut next = current.clone();
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some((material, master_key)) = &self.rewrap {
            next.key_material = material.clone();
            next.master_key = master_key.clone();
        }
        next.key_alt_names
            .retain(|name| !self.remove_alt_names.contains(name));
        for name in &self.add_alt_names {
            if !next.has_alt_name(name) {
                next.key_alt_names.push(name.clone());
            }
        }
        next.update_date = next_update_date(current.update_date);
        next.version = current.version + 1;
        Ok(next)
    }
}

/// Returns an update date strictly after `previous`.
#[must_use]
pub fn next_update_date(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    let floor = previous + Duration::microseconds(1);
    now.max(floor)
}

/// Fails if `candidate` is active and shares an alternate name with another
/// active document.
pub fn check_alt_names<'a>(
    candidate: &KeyDocument,
    others: impl IntoIterator<Item = &'a KeyDocument>,
) -> StorageResult<()> {
    if !candidate.is_active() || candidate.key_alt_names.is_empty() {
        return Ok(());
    }
    for other in others {
        if other.id == candidate.id || !other.is_active() {
            continue;
        }
        if let Some(name) = candidate
            .key_alt_names
            .iter()
            .find(|name| other.has_alt_name(name))
        {
            return Err(StorageError::AltNameConflict(name.clone()));
        }
    }
    Ok(())
}

/// Picks the document an alternate-name lookup resolves to.
pub fn select_by_alt_name<'a>(
    docs: impl IntoIterator<Item = &'a KeyDocument>,
    name: &str,
) -> Option<KeyDocument> {
    let mut fallback: Option<&KeyDocument> = None;
    for doc in docs.into_iter().filter(|d| d.has_alt_name(name)) {
        if doc.is_active() {
            return Some(doc.clone());
        }
        if fallback.map_or(true, |f| doc.update_date > f.update_date) {
            fallback = Some(doc);
        }
    }
    fallback.cloned()
}
