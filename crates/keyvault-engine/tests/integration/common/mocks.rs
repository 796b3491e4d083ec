//! Mock implementations for testing.

use async_trait::async_trait;
use keyvault_core::{KeyDocument, KeyId, KmsProvider, ProviderMetadata};
use keyvault_crypto::{CryptoError, CryptoResult, MasterKeyProvider, RemoteKmsClient, SecureBytes};
use keyvault_store::{
    InMemoryKeyVaultStore, KeyCursor, KeyFilter, KeyMutation, KeyVaultStore, StorageError,
    StorageResult,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const FAKE_MASK: u8 = 0x5a;

/// Remote KMS stand-in that masks key material with a provider prefix.
#[derive(Debug, Default)]
pub struct FakeKmsClient {
    /// Reject every call as if the credentials were invalid.
    reject_credentials: AtomicBool,
    /// Calls received.
    calls: AtomicUsize,
}

impl FakeKmsClient {
    /// Creates a client that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client whose credentials are rejected.
    pub fn with_invalid_credentials() -> Self {
        let client = Self::new();
        client.set_reject_credentials(true);
        client
    }

    /// Toggles credential rejection.
    pub fn set_reject_credentials(&self, reject: bool) {
        self.reject_credentials.store(reject, Ordering::SeqCst);
    }

    /// Returns the number of calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_credentials(&self, provider: KmsProvider) -> CryptoResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_credentials.load(Ordering::SeqCst) {
            return Err(CryptoError::ProviderAuthFailure {
                provider,
                message: "The security token included in the request is invalid".to_string(),
            });
        }
        Ok(())
    }

    fn prefix(provider: KmsProvider) -> Vec<u8> {
        format!("fake-{provider}:").into_bytes()
    }
}

#[async_trait]
impl RemoteKmsClient for FakeKmsClient {
    async fn encrypt(
        &self,
        provider: KmsProvider,
        plaintext: &[u8],
        _metadata: &ProviderMetadata,
    ) -> CryptoResult<Vec<u8>> {
        self.check_credentials(provider)?;
        let mut out = Self::prefix(provider);
        out.extend(plaintext.iter().map(|b| b ^ FAKE_MASK));
        Ok(out)
    }

    async fn decrypt(
        &self,
        provider: KmsProvider,
        ciphertext: &[u8],
        _metadata: &ProviderMetadata,
    ) -> CryptoResult<SecureBytes> {
        self.check_credentials(provider)?;
        let prefix = Self::prefix(provider);
        let body = ciphertext
            .strip_prefix(prefix.as_slice())
            .ok_or(CryptoError::AuthenticationFailed)?;
        Ok(SecureBytes::new(body.iter().map(|b| b ^ FAKE_MASK).collect()))
    }
}

/// Provider wrapper that delays calls.
pub struct SlowProvider {
    inner: Arc<dyn MasterKeyProvider>,
    delay: Duration,
    delay_wraps: bool,
}

impl SlowProvider {
    /// Wraps `inner`, sleeping `delay` before each call.
    pub fn new(inner: Arc<dyn MasterKeyProvider>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            delay_wraps: true,
        }
    }

    /// Wraps `inner`, sleeping `delay` before each unwrap only.
    pub fn slow_unwraps(inner: Arc<dyn MasterKeyProvider>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            delay_wraps: false,
        }
    }
}

#[async_trait]
impl MasterKeyProvider for SlowProvider {
    fn kind(&self) -> KmsProvider {
        self.inner.kind()
    }

    fn validate(&self, metadata: &ProviderMetadata) -> CryptoResult<()> {
        self.inner.validate(metadata)
    }

    async fn wrap(
        &self,
        plaintext: &SecureBytes,
        metadata: &ProviderMetadata,
    ) -> CryptoResult<Vec<u8>> {
        if self.delay_wraps {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.wrap(plaintext, metadata).await
    }

    async fn unwrap(
        &self,
        ciphertext: &[u8],
        metadata: &ProviderMetadata,
    ) -> CryptoResult<SecureBytes> {
        tokio::time::sleep(self.delay).await;
        self.inner.unwrap(ciphertext, metadata).await
    }
}

/// In-memory store with injectable faults.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryKeyVaultStore,
    /// Fail every insert as unavailable.
    fail_inserts: AtomicBool,
    /// Fail every update as unavailable.
    fail_updates: AtomicBool,
    /// Modify the document right before the next update lands.
    interfere_once: AtomicBool,
    /// Updates received.
    updates: AtomicUsize,
}

impl FaultyStore {
    /// Creates a store without faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles insert failures.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Toggles update failures.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Makes a concurrent writer touch the document before the next update.
    pub fn interfere_with_next_update(&self) {
        self.interfere_once.store(true, Ordering::SeqCst);
    }

    /// Returns the number of updates received.
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyVaultStore for FaultyStore {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn insert(&self, doc: KeyDocument) -> StorageResult<KeyId> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected insert failure".to_string()));
        }
        self.inner.insert(doc).await
    }

    async fn find_by_id(&self, id: KeyId) -> StorageResult<Option<KeyDocument>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_alt_name(&self, name: &str) -> StorageResult<Option<KeyDocument>> {
        self.inner.find_by_alt_name(name).await
    }

    async fn find_all(&self, filter: &KeyFilter) -> StorageResult<KeyCursor> {
        self.inner.find_all(filter).await
    }

    async fn update(&self, id: KeyId, mutation: KeyMutation) -> StorageResult<KeyDocument> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected update failure".to_string()));
        }
        if self.interfere_once.swap(false, Ordering::SeqCst) {
            self.inner
                .update(id, KeyMutation::new().add_alt_name("concurrent-writer"))
                .await?;
        }
        self.inner.update(id, mutation).await
    }

    async fn delete(&self, id: KeyId) -> StorageResult<u64> {
        self.inner.delete(id).await
    }
}
