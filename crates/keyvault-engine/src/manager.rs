//! Data key lifecycle.
//!
//! A data key moves through `Creating -> Active -> Deprecated -> Deleted`.
//! Every mutation ends in exactly one store write (rotation: one write per
//! document, with compensation), so dropping an operation future before that
//! write leaves the vault untouched.

use crate::cache::{CacheStats, KeyCache};
use crate::config::{DeletePolicy, ManagerConfig};
use async_trait::async_trait;
use dashmap::DashMap;
use keyvault_core::{
    EncryptionAlgorithm, KeyDocument, KeyId, KeyRef, KeyStatus, KeyVaultError, KeyVaultResult,
    KmsProvider, MasterKey,
};
use keyvault_crypto::{
    CryptoResult, MasterKeyProvider, MasterKeyProviders, SecureBytes, AES_256_KEY_SIZE,
};
use keyvault_store::{KeyFilter, KeyMutation, KeyVaultStore, StorageResult};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Options for [`KeyManager::create_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateKeyOptions {
    /// Alternate names for the new key.
    pub alt_names: Vec<String>,
    /// Master key that wraps the new key.
    pub master_key: MasterKey,
}

impl CreateKeyOptions {
    /// Creates options for a key wrapped by `master_key`.
    #[must_use]
    pub fn new(master_key: MasterKey) -> Self {
        Self {
            alt_names: Vec::new(),
            master_key,
        }
    }

    /// Adds an alternate name.
    #[must_use]
    pub fn with_alt_name(mut self, name: impl Into<String>) -> Self {
        self.alt_names.push(name.into());
        self
    }
}

/// An unwrapped data key, scoped to the operation that resolved it.
///
/// The key material is zeroized on drop and redacted from `Debug`.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    id: KeyId,
    dek: SecureBytes,
    status: KeyStatus,
    algorithm_hint: Option<EncryptionAlgorithm>,
}

impl ResolvedKey {
    /// Key id.
    #[must_use]
    pub fn id(&self) -> KeyId {
        self.id
    }

    /// Plaintext data key.
    #[must_use]
    pub fn dek(&self) -> &SecureBytes {
        &self.dek
    }

    /// Status of the key document when it was resolved.
    #[must_use]
    pub fn status(&self) -> KeyStatus {
        self.status
    }

    /// Algorithm the caller intends to use, if known.
    #[must_use]
    pub fn algorithm_hint(&self) -> Option<EncryptionAlgorithm> {
        self.algorithm_hint
    }

    /// Attaches an algorithm hint.
    #[must_use]
    pub fn with_algorithm_hint(mut self, algorithm: EncryptionAlgorithm) -> Self {
        self.algorithm_hint = Some(algorithm);
        self
    }
}

/// Counts known ciphertexts that reference a data key.
///
/// The answer is best effort: a vault cannot prove that no external copy of
/// a ciphertext exists.
#[async_trait]
pub trait ReferenceChecker: Send + Sync {
    /// Returns the number of known ciphertexts encrypted under `id`.
    async fn count_references(&self, id: KeyId) -> KeyVaultResult<u64>;
}

/// Outcome of [`KeyManager::rewrap_all`].
#[derive(Debug, Default)]
pub struct RewrapSummary {
    /// Rewrapped keys with their new document version.
    pub rewrapped: Vec<(KeyId, u64)>,
    /// Keys that could not be rewrapped.
    pub failed: Vec<(KeyId, KeyVaultError)>,
}

impl RewrapSummary {
    /// Returns true if every key was rewrapped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Manages data keys stored in a key vault.
pub struct KeyManager {
    store: Arc<dyn KeyVaultStore>,
    providers: MasterKeyProviders,
    config: ManagerConfig,
    cache: Option<KeyCache>,
    locks: DashMap<KeyId, Arc<Mutex<()>>>,
    reference_checker: Option<Arc<dyn ReferenceChecker>>,
}

impl KeyManager {
    /// Creates a manager with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn KeyVaultStore>, providers: MasterKeyProviders) -> Self {
        Self::with_config(store, providers, ManagerConfig::default())
    }

    /// Creates a manager.
    #[must_use]
    pub fn with_config(
        store: Arc<dyn KeyVaultStore>,
        providers: MasterKeyProviders,
        config: ManagerConfig,
    ) -> Self {
        Self {
            store,
            providers,
            cache: config.cache.as_ref().map(KeyCache::new),
            config,
            locks: DashMap::new(),
            reference_checker: None,
        }
    }

    /// Sets the checker consulted by [`DeletePolicy::RequireUnreferenced`].
    #[must_use]
    pub fn with_reference_checker(mut self, checker: Arc<dyn ReferenceChecker>) -> Self {
        self.reference_checker = Some(checker);
        self
    }

    /// Returns the key vault store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyVaultStore> {
        &self.store
    }

    /// Returns the configured master key providers.
    #[must_use]
    pub fn providers(&self) -> &MasterKeyProviders {
        &self.providers
    }

    /// Returns cache statistics, if caching is enabled.
    #[must_use]
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(KeyCache::stats)
    }

    /// Creates a new active data key and returns its id.
    pub async fn create_key(&self, options: CreateKeyOptions) -> KeyVaultResult<KeyId> {
        validate_alt_names(&options.alt_names)?;
        let provider = self.provider_for(&options.master_key)?;

        let wrapped = {
            let dek = SecureBytes::random(AES_256_KEY_SIZE);
            self.provider_call(
                options.master_key.provider,
                "wrap",
                provider.wrap(&dek, &options.master_key.metadata),
            )
            .await?
        };

        let doc = KeyDocument::new(
            KeyId::new(),
            wrapped,
            options.master_key,
            options.alt_names,
        );
        let provider = doc.master_key.provider;
        let id = self.store_call("insert", self.store.insert(doc)).await?;

        info!(key_id = %id, provider = %provider, "Data key created");
        Ok(id)
    }

    /// Looks up a key document.
    pub async fn get_key(&self, key: &KeyRef) -> KeyVaultResult<KeyDocument> {
        let doc = match key {
            KeyRef::Id(id) => self.store_call("find_by_id", self.store.find_by_id(*id)).await?,
            KeyRef::AltName(name) => {
                self.store_call("find_by_alt_name", self.store.find_by_alt_name(name))
                    .await?
            }
        };
        doc.ok_or_else(|| KeyVaultError::KeyNotFound(key.to_string()))
    }

    /// Lists key documents matching `filter`.
    pub async fn list_keys(&self, filter: &KeyFilter) -> KeyVaultResult<Vec<KeyDocument>> {
        Ok(self
            .store_call("find_all", self.store.find_all(filter))
            .await?
            .collect())
    }

    /// Replaces an active key with a fresh data key under the same master
    /// key and returns the new id.
    ///
    /// The old document is marked deprecated but kept, so ciphertexts
    /// produced under it stay decryptable. Alternate names move to the new
    /// key once it is committed; until then they resolve to the old one.
    pub async fn rotate_key(&self, key: &KeyRef) -> KeyVaultResult<KeyId> {
        let old_id = self.get_key(key).await?.id;
        let _guard = self.lock_key(old_id).await;

        let old = self.get_key(&KeyRef::Id(old_id)).await?;
        if !old.is_active() {
            return Err(KeyVaultError::InvalidState(format!(
                "key {old_id} is deprecated; rotate its active successor instead"
            )));
        }

        let provider = self.provider_for(&old.master_key)?;
        let wrapped = {
            let dek = SecureBytes::random(AES_256_KEY_SIZE);
            self.provider_call(
                old.master_key.provider,
                "wrap",
                provider.wrap(&dek, &old.master_key.metadata),
            )
            .await?
        };
        let successor = KeyDocument::new(
            KeyId::new(),
            wrapped,
            old.master_key.clone(),
            old.key_alt_names.clone(),
        );

        let deprecated = self
            .store_call(
                "update",
                self.store.update(
                    old_id,
                    KeyMutation::new()
                        .expect_update_date(old.update_date)
                        .set_status(KeyStatus::Deprecated),
                ),
            )
            .await?;
        self.invalidate(old_id);

        let new_id = match self.store_call("insert", self.store.insert(successor)).await {
            Ok(id) => id,
            Err(err) => {
                self.restore_active(&deprecated).await;
                return Err(err);
            }
        };

        info!(key_id = %old_id, successor = %new_id, "Data key rotated");
        Ok(new_id)
    }

    async fn restore_active(&self, deprecated: &KeyDocument) {
        let restore = KeyMutation::new()
            .expect_update_date(deprecated.update_date)
            .set_status(KeyStatus::Active);
        match self
            .store_call("update", self.store.update(deprecated.id, restore))
            .await
        {
            Ok(_) => debug!(key_id = %deprecated.id, "Rotation rolled back"),
            Err(e) => warn!(
                key_id = %deprecated.id,
                error = %e,
                "Rotation rollback failed; key left deprecated without a successor"
            ),
        }
    }

    /// Rewraps a key's data key under `target` (or its current master key)
    /// and returns the new document version.
    ///
    /// The data key itself is unchanged. The document is replaced in one
    /// conditional update; if it changed since it was read the rewrap fails
    /// with `RewrapConflict` and nothing is written.
    pub async fn rewrap_key(
        &self,
        key: &KeyRef,
        target: Option<MasterKey>,
    ) -> KeyVaultResult<u64> {
        let id = self.get_key(key).await?.id;
        let _guard = self.lock_key(id).await;

        let doc = self.get_key(&KeyRef::Id(id)).await?;
        let target = target.unwrap_or_else(|| doc.master_key.clone());
        let source = self.provider_for(&doc.master_key)?;
        let destination = self.provider_for(&target)?;

        let wrapped = {
            let dek = self
                .provider_call(
                    doc.master_key.provider,
                    "unwrap",
                    source.unwrap(&doc.key_material, &doc.master_key.metadata),
                )
                .await?;
            self.provider_call(
                target.provider,
                "wrap",
                destination.wrap(&dek, &target.metadata),
            )
            .await?
        };

        let from = doc.master_key.provider;
        let to = target.provider;
        let mutation = KeyMutation::new()
            .expect_update_date(doc.update_date)
            .rewrap(wrapped, target);
        let updated = self
            .store_call("update", self.store.update(id, mutation))
            .await
            .map_err(|e| match e {
                KeyVaultError::ConcurrentModification(id) => KeyVaultError::RewrapConflict(id),
                other => other,
            })?;
        self.invalidate(id);

        info!(key_id = %id, from = %from, to = %to, version = updated.version, "Data key rewrapped");
        Ok(updated.version)
    }

    /// Rewraps every key matching `filter`, one document at a time.
    pub async fn rewrap_all(
        &self,
        filter: &KeyFilter,
        target: Option<MasterKey>,
    ) -> KeyVaultResult<RewrapSummary> {
        let mut summary = RewrapSummary::default();
        for doc in self.list_keys(filter).await? {
            match self.rewrap_key(&KeyRef::Id(doc.id), target.clone()).await {
                Ok(version) => summary.rewrapped.push((doc.id, version)),
                Err(e) => {
                    warn!(key_id = %doc.id, error = %e, "Rewrap failed");
                    summary.failed.push((doc.id, e));
                }
            }
        }
        Ok(summary)
    }

    /// Deletes a key using the configured deletion policy.
    pub async fn delete_key(&self, key: &KeyRef) -> KeyVaultResult<()> {
        self.delete_key_with(key, self.config.delete_policy).await
    }

    /// Deletes a key.
    ///
    /// Deletion is advisory: the reference check only covers ciphertexts the
    /// configured [`ReferenceChecker`] knows about.
    pub async fn delete_key_with(&self, key: &KeyRef, policy: DeletePolicy) -> KeyVaultResult<()> {
        let id = self.get_key(key).await?.id;
        let _guard = self.lock_key(id).await;

        if policy == DeletePolicy::RequireUnreferenced {
            match &self.reference_checker {
                Some(checker) => {
                    let references = checker.count_references(id).await?;
                    if references > 0 {
                        warn!(key_id = %id, references, "Refusing to delete referenced data key");
                        return Err(KeyVaultError::KeyInUse { id, references });
                    }
                }
                None => debug!(key_id = %id, "No reference checker configured"),
            }
        }

        let deleted = self.store_call("delete", self.store.delete(id)).await?;
        self.invalidate(id);
        if deleted == 0 {
            return Err(KeyVaultError::KeyNotFound(id.to_string()));
        }

        warn!(
            key_id = %id,
            policy = ?policy,
            "Data key deleted; values encrypted under it can no longer be decrypted"
        );
        Ok(())
    }

    /// Adds an alternate name to a key.
    pub async fn add_alt_name(&self, key: &KeyRef, name: &str) -> KeyVaultResult<KeyDocument> {
        validate_alt_names(&[name.to_string()])?;
        self.mutate(key, KeyMutation::new().add_alt_name(name)).await
    }

    /// Removes an alternate name from a key.
    pub async fn remove_alt_name(&self, key: &KeyRef, name: &str) -> KeyVaultResult<KeyDocument> {
        self.mutate(key, KeyMutation::new().remove_alt_name(name)).await
    }

    async fn mutate(&self, key: &KeyRef, mutation: KeyMutation) -> KeyVaultResult<KeyDocument> {
        let id = self.get_key(key).await?.id;
        let _guard = self.lock_key(id).await;

        let doc = self.get_key(&KeyRef::Id(id)).await?;
        let updated = self
            .store_call(
                "update",
                self.store
                    .update(id, mutation.expect_update_date(doc.update_date)),
            )
            .await?;
        debug!(key_id = %id, version = updated.version, "Key document updated");
        Ok(updated)
    }

    /// Looks a key up and unwraps its data key.
    ///
    /// A key rotated, rewrapped or deleted while it was being unwrapped is
    /// returned to this caller but not cached.
    pub async fn resolve_key(&self, key: &KeyRef) -> KeyVaultResult<ResolvedKey> {
        let epoch = self.cache.as_ref().map(KeyCache::epoch);
        if let KeyRef::Id(id) = key {
            if let Some(resolved) = self.cached(*id) {
                return Ok(resolved);
            }
        }

        let doc = self.get_key(key).await?;
        if let Some(resolved) = self.cached(doc.id) {
            return Ok(resolved);
        }

        let provider = self.provider_for(&doc.master_key)?;
        let dek = self
            .provider_call(
                doc.master_key.provider,
                "unwrap",
                provider.unwrap(&doc.key_material, &doc.master_key.metadata),
            )
            .await?;
        if dek.len() != AES_256_KEY_SIZE {
            return Err(KeyVaultError::Crypto(format!(
                "unwrapped data key {} has {} bytes, expected {AES_256_KEY_SIZE}",
                doc.id,
                dek.len()
            )));
        }

        if let (Some(cache), Some(epoch)) = (&self.cache, epoch) {
            if !cache.insert(doc.id, &dek, doc.status, epoch) {
                debug!(key_id = %doc.id, "Key changed while resolving; not cached");
            }
        }
        debug!(key_id = %doc.id, "Data key resolved");
        Ok(ResolvedKey {
            id: doc.id,
            dek,
            status: doc.status,
            algorithm_hint: None,
        })
    }

    /// Scrubs cached key material. The manager stays usable.
    pub fn shutdown(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        info!("Key manager shut down");
    }

    fn cached(&self, id: KeyId) -> Option<ResolvedKey> {
        let (dek, status) = self.cache.as_ref()?.get(id)?;
        Some(ResolvedKey {
            id,
            dek,
            status,
            algorithm_hint: None,
        })
    }

    fn invalidate(&self, id: KeyId) {
        if let Some(cache) = &self.cache {
            cache.invalidate(id);
        }
    }

    async fn lock_key(&self, id: KeyId) -> KeyLock<'_> {
        let mut held = KeyLock {
            locks: &self.locks,
            id,
            guard: None,
        };
        let lock = self.locks.entry(id).or_default().clone();
        held.guard = Some(lock.lock_owned().await);
        held
    }

    fn provider_for(&self, master_key: &MasterKey) -> KeyVaultResult<Arc<dyn MasterKeyProvider>> {
        let provider = self.providers.get(master_key.provider)?;
        provider.validate(&master_key.metadata)?;
        Ok(provider)
    }

    async fn store_call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StorageResult<T>>,
    ) -> KeyVaultResult<T> {
        match tokio::time::timeout(self.config.timeouts.store, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                warn!(op, store = self.store.name(), "Key vault store call timed out");
                Err(KeyVaultError::Timeout(format!("key vault store {op}")))
            }
        }
    }

    async fn provider_call<T>(
        &self,
        provider: KmsProvider,
        op: &'static str,
        fut: impl Future<Output = CryptoResult<T>>,
    ) -> KeyVaultResult<T> {
        match tokio::time::timeout(self.config.timeouts.provider, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                warn!(op, provider = %provider, "Master key provider call timed out");
                Err(KeyVaultError::Timeout(format!("{provider} {op}")))
            }
        }
    }
}

/// Per-id mutation lock. Dropping it releases the lock and removes the map
/// entry once no other task holds or waits on it.
struct KeyLock<'a> {
    locks: &'a DashMap<KeyId, Arc<Mutex<()>>>,
    id: KeyId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("store", &self.store.name())
            .field("providers", &self.providers)
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

fn validate_alt_names(names: &[String]) -> KeyVaultResult<()> {
    for (i, name) in names.iter().enumerate() {
        if name.trim().is_empty() {
            return Err(KeyVaultError::InvalidRequest(
                "key alt names must not be empty".to_string(),
            ));
        }
        if names[..i].contains(name) {
            return Err(KeyVaultError::InvalidRequest(format!(
                "duplicate key alt name '{name}'"
            )));
        }
    }
    Ok(())
}
