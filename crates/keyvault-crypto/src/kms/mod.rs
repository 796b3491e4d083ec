//! Master key providers.
//!
//! A master key provider wraps and unwraps data encryption keys. Every key
//! document records which provider wrapped it; [`MasterKeyProviders`]
//! dispatches on that tag so documents wrapped by different providers can
//! live in the same vault.

mod local;
mod remote;

#[cfg(feature = "aws-kms")]
pub mod aws;

pub use local::LocalMasterKeyProvider;
pub use remote::{
    AwsMasterKeyProvider, AzureMasterKeyProvider, GcpMasterKeyProvider, KmipMasterKeyProvider,
    RemoteKmsClient,
};

use crate::{CryptoError, CryptoResult, SecureBytes};
use async_trait::async_trait;
use keyvault_core::{KmsProvider, ProviderMetadata};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Wraps and unwraps data encryption keys under a master key.
#[async_trait]
pub trait MasterKeyProvider: Send + Sync {
    /// The provider tag this implementation serves.
    fn kind(&self) -> KmsProvider;

    /// Checks that `metadata` identifies a master key for this provider.
    fn validate(&self, metadata: &ProviderMetadata) -> CryptoResult<()> {
        let _ = metadata;
        Ok(())
    }

    /// Encrypts a data key.
    async fn wrap(
        &self,
        plaintext: &SecureBytes,
        metadata: &ProviderMetadata,
    ) -> CryptoResult<Vec<u8>>;

    /// Decrypts a wrapped data key.
    async fn unwrap(
        &self,
        ciphertext: &[u8],
        metadata: &ProviderMetadata,
    ) -> CryptoResult<SecureBytes>;
}

/// Registry of master key providers keyed by provider tag.
#[derive(Clone, Default)]
pub struct MasterKeyProviders {
    providers: HashMap<KmsProvider, Arc<dyn MasterKeyProvider>>,
}

impl MasterKeyProviders {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider, replacing any previous one with the same tag.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn MasterKeyProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Registers a provider, replacing any previous one with the same tag.
    pub fn register(&mut self, provider: Arc<dyn MasterKeyProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Returns the provider for `kind`.
    pub fn get(&self, kind: KmsProvider) -> CryptoResult<Arc<dyn MasterKeyProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(CryptoError::ProviderNotConfigured(kind))
    }

    /// Returns true if a provider is registered for `kind`.
    #[must_use]
    pub fn contains(&self, kind: KmsProvider) -> bool {
        self.providers.contains_key(&kind)
    }

    /// Registered provider tags in stable order.
    #[must_use]
    pub fn kinds(&self) -> Vec<KmsProvider> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for MasterKeyProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKeyProviders")
            .field("providers", &self.kinds())
            .finish()
    }
}
