//! Remote KMS-backed master key providers.

use super::MasterKeyProvider;
use crate::{CryptoError, CryptoResult, SecureBytes};
use async_trait::async_trait;
use keyvault_core::{KmsProvider, ProviderMetadata};
use std::sync::Arc;

/// Transport to a remote key management service.
///
/// Implementations perform the provider's encrypt/decrypt call against the
/// master key identified by `metadata` and return the provider ciphertext
/// verbatim.
#[async_trait]
pub trait RemoteKmsClient: Send + Sync {
    /// Encrypts a data key under the remote master key.
    async fn encrypt(
        &self,
        provider: KmsProvider,
        plaintext: &[u8],
        metadata: &ProviderMetadata,
    ) -> CryptoResult<Vec<u8>>;

    /// Decrypts a data key previously encrypted by [`Self::encrypt`].
    async fn decrypt(
        &self,
        provider: KmsProvider,
        ciphertext: &[u8],
        metadata: &ProviderMetadata,
    ) -> CryptoResult<SecureBytes>;
}

fn require(
    provider: KmsProvider,
    metadata: &ProviderMetadata,
    fields: &[&str],
) -> CryptoResult<()> {
    for field in fields {
        match metadata.get(*field) {
            Some(value) if !value.trim().is_empty() => {}
            _ => {
                return Err(CryptoError::InvalidMetadata {
                    provider,
                    field: (*field).to_string(),
                })
            }
        }
    }
    Ok(())
}

macro_rules! remote_provider {
    ($(#[$meta:meta])* $name:ident, $kind:expr, [$($field:literal),*]) => {
        $(#[$meta])*
        pub struct $name {
            client: Arc<dyn RemoteKmsClient>,
        }

        impl $name {
            /// Required master key metadata fields.
            pub const REQUIRED_FIELDS: &'static [&'static str] = &[$($field),*];

            /// Creates a provider delegating to `client`.
            #[must_use]
            pub fn new(client: Arc<dyn RemoteKmsClient>) -> Self {
                Self { client }
            }
        }

        #[async_trait]
        impl MasterKeyProvider for $name {
            fn kind(&self) -> KmsProvider {
                $kind
            }

            fn validate(&self, metadata: &ProviderMetadata) -> CryptoResult<()> {
                require($kind, metadata, Self::REQUIRED_FIELDS)
            }

            async fn wrap(
                &self,
                plaintext: &SecureBytes,
                metadata: &ProviderMetadata,
            ) -> CryptoResult<Vec<u8>> {
                self.validate(metadata)?;
                self.client.encrypt($kind, plaintext.as_slice(), metadata).await
            }

            async fn unwrap(
                &self,
                ciphertext: &[u8],
                metadata: &ProviderMetadata,
            ) -> CryptoResult<SecureBytes> {
                self.validate(metadata)?;
                self.client.decrypt($kind, ciphertext, metadata).await
            }
        }
    };
}

remote_provider!(
    /// AWS KMS master key provider (`region`, `key`).
    AwsMasterKeyProvider,
    KmsProvider::Aws,
    ["region", "key"]
);

remote_provider!(
    /// Azure Key Vault master key provider (`keyVaultEndpoint`, `keyName`).
    AzureMasterKeyProvider,
    KmsProvider::Azure,
    ["keyVaultEndpoint", "keyName"]
);

remote_provider!(
    /// GCP Cloud KMS master key provider.
    GcpMasterKeyProvider,
    KmsProvider::Gcp,
    ["projectId", "location", "keyRing", "keyName"]
);

remote_provider!(
    /// KMIP master key provider. `keyId` is optional.
    KmipMasterKeyProvider,
    KmsProvider::Kmip,
    []
);
