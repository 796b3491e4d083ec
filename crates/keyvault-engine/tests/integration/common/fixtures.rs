//! Test fixtures for integration tests.

use super::mocks::FakeKmsClient;
use keyvault_core::{KmsProvider, MasterKey};
use keyvault_crypto::{
    AwsMasterKeyProvider, AzureMasterKeyProvider, GcpMasterKeyProvider, KmipMasterKeyProvider,
    LocalMasterKeyProvider, MasterKeyProviders,
};
use keyvault_engine::{EncryptionEngine, KeyManager, ManagerConfig};
use keyvault_store::KeyVaultStore;
use std::sync::Arc;

/// Salt used for passphrase-derived test master keys.
pub const TEST_SALT: &[u8] = b"keyvault-integration-salt";

/// Registry holding only a random local provider.
pub fn local_providers() -> MasterKeyProviders {
    MasterKeyProviders::new().with_provider(Arc::new(LocalMasterKeyProvider::generate()))
}

/// Registry holding a passphrase-derived local provider.
pub fn passphrase_providers(passphrase: &str) -> MasterKeyProviders {
    let provider = LocalMasterKeyProvider::from_passphrase(passphrase, TEST_SALT)
        .expect("passphrase provider");
    MasterKeyProviders::new().with_provider(Arc::new(provider))
}

/// Adds every remote provider backed by `client` to `providers`.
pub fn with_remote_providers(
    mut providers: MasterKeyProviders,
    client: Arc<FakeKmsClient>,
) -> MasterKeyProviders {
    providers.register(Arc::new(AwsMasterKeyProvider::new(client.clone())));
    providers.register(Arc::new(AzureMasterKeyProvider::new(client.clone())));
    providers.register(Arc::new(GcpMasterKeyProvider::new(client.clone())));
    providers.register(Arc::new(KmipMasterKeyProvider::new(client)));
    providers
}

/// AWS master key descriptor.
pub fn aws_master_key() -> MasterKey {
    MasterKey::new(KmsProvider::Aws)
        .with("region", "eu-west-1")
        .with(
            "key",
            "arn:aws:kms:eu-west-1:111122223333:key/1234abcd-12ab-34cd-56ef-1234567890ab",
        )
}

/// Azure master key descriptor.
pub fn azure_master_key() -> MasterKey {
    MasterKey::new(KmsProvider::Azure)
        .with("keyVaultEndpoint", "https://patients.vault.azure.net")
        .with("keyName", "records")
}

/// GCP master key descriptor.
pub fn gcp_master_key() -> MasterKey {
    MasterKey::new(KmsProvider::Gcp)
        .with("projectId", "health-prod")
        .with("location", "global")
        .with("keyRing", "records")
        .with("keyName", "patients")
}

/// KMIP master key descriptor.
pub fn kmip_master_key() -> MasterKey {
    MasterKey::new(KmsProvider::Kmip).with("keyId", "1")
}

/// Key manager over `store` with the default configuration.
pub fn manager(store: Arc<dyn KeyVaultStore>, providers: MasterKeyProviders) -> Arc<KeyManager> {
    Arc::new(KeyManager::new(store, providers))
}

/// Key manager over `store` with `config`.
pub fn manager_with_config(
    store: Arc<dyn KeyVaultStore>,
    providers: MasterKeyProviders,
    config: ManagerConfig,
) -> Arc<KeyManager> {
    Arc::new(KeyManager::with_config(store, providers, config))
}

/// Encryption engine over `manager`.
pub fn engine(manager: &Arc<KeyManager>) -> EncryptionEngine {
    EncryptionEngine::new(manager.clone())
}
