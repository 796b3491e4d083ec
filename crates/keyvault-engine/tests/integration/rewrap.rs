//! Rewrap integration tests.

use super::common::*;
use keyvault_core::{EncryptionAlgorithm, KeyRef, KeyVaultError, KmsProvider, MasterKey};
use keyvault_crypto::{LocalMasterKeyProvider, MasterKeyProviders};
use keyvault_engine::{CreateKeyOptions, EncryptionRequest, ManagerConfig, Timeouts};
use keyvault_store::{InMemoryKeyVaultStore, KeyFilter, KeyVaultStore};
use std::sync::Arc;
use std::time::Duration;

async fn encrypt_ssn(engine: &keyvault_engine::EncryptionEngine, key: KeyRef) -> Vec<u8> {
    engine
        .encrypt(&EncryptionRequest::new(
            key,
            EncryptionAlgorithm::Deterministic,
            "123-45-6789",
        ))
        .await
        .unwrap()
}

/// Tests a rewrap from local to a remote provider.
#[tokio::test]
async fn test_rewrap_local_to_remote() {
    let client = Arc::new(FakeKmsClient::new());
    let providers = with_remote_providers(local_providers(), client.clone());
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), providers);
    let engine = engine(&manager);

    let id = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()).with_alt_name("patient-ssn"))
        .await
        .unwrap();
    let ciphertext = encrypt_ssn(&engine, KeyRef::Id(id)).await;
    let before = manager.get_key(&KeyRef::Id(id)).await.unwrap();

    let version = manager
        .rewrap_key(&KeyRef::alt_name("patient-ssn"), Some(aws_master_key()))
        .await
        .unwrap();
    assert_eq!(version, before.version + 1);

    let after = manager.get_key(&KeyRef::Id(id)).await.unwrap();
    assert_eq!(after.master_key, aws_master_key());
    assert_ne!(after.key_material, before.key_material);
    assert_eq!(after.creation_date, before.creation_date);
    assert!(after.update_date > before.update_date);
    assert_eq!(after.key_alt_names, before.key_alt_names);

    // same data key, so old ciphertexts and deterministic output are unchanged
    assert_eq!(
        engine.decrypt(&ciphertext).await.unwrap().as_str(),
        Some("123-45-6789")
    );
    assert_eq!(encrypt_ssn(&engine, KeyRef::Id(id)).await, ciphertext);
    assert!(client.calls() >= 2);
}

/// Tests that rejected remote credentials leave the key untouched.
#[tokio::test]
async fn test_rewrap_with_invalid_credentials() {
    let client = Arc::new(FakeKmsClient::with_invalid_credentials());
    let providers = with_remote_providers(local_providers(), client);
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), providers);
    let engine = engine(&manager);

    let id = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()).with_alt_name("patient-ssn"))
        .await
        .unwrap();
    let ciphertext = encrypt_ssn(&engine, KeyRef::alt_name("patient-ssn")).await;
    let before = manager.get_key(&KeyRef::Id(id)).await.unwrap();

    let result = manager
        .rewrap_key(&KeyRef::Id(id), Some(azure_master_key()))
        .await;
    assert!(matches!(result, Err(KeyVaultError::ProviderAuthFailure(_))));
    assert!(!result.unwrap_err().is_retryable());

    assert_eq!(manager.get_key(&KeyRef::Id(id)).await.unwrap(), before);
    assert_eq!(
        engine.decrypt(&ciphertext).await.unwrap().as_str(),
        Some("123-45-6789")
    );
}

/// Tests that a rewrap overtaken by a concurrent writer is rejected.
#[tokio::test]
async fn test_rewrap_conflict() {
    let store = Arc::new(FaultyStore::new());
    let manager = manager(store.clone(), local_providers());
    let id = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()))
        .await
        .unwrap();
    let before = manager.get_key(&KeyRef::Id(id)).await.unwrap();

    store.interfere_with_next_update();
    let err = manager.rewrap_key(&KeyRef::Id(id), None).await.unwrap_err();
    assert!(matches!(err, KeyVaultError::RewrapConflict(conflicted) if conflicted == id));
    assert!(err.is_retryable());

    let after = manager.get_key(&KeyRef::Id(id)).await.unwrap();
    assert_eq!(after.key_material, before.key_material);
    assert!(after.has_alt_name("concurrent-writer"));

    // a retry against the fresh document succeeds
    let version = manager.rewrap_key(&KeyRef::Id(id), None).await.unwrap();
    assert_eq!(version, after.version + 1);
}

/// Tests that a store failure on the final write leaves the key untouched.
#[tokio::test]
async fn test_rewrap_store_failure() {
    let store = Arc::new(FaultyStore::new());
    let manager = manager(store.clone(), local_providers());
    let id = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()))
        .await
        .unwrap();
    let before = manager.get_key(&KeyRef::Id(id)).await.unwrap();

    store.set_fail_updates(true);
    let result = manager.rewrap_key(&KeyRef::Id(id), None).await;
    assert!(matches!(result, Err(KeyVaultError::StorageUnavailable(_))));

    store.set_fail_updates(false);
    assert_eq!(manager.get_key(&KeyRef::Id(id)).await.unwrap(), before);
}

fn slow_local_providers(provider: Arc<LocalMasterKeyProvider>, delay: Duration) -> MasterKeyProviders {
    MasterKeyProviders::new().with_provider(Arc::new(SlowProvider::new(provider, delay)))
}

/// Tests that a provider deadline aborts the rewrap before any write.
#[tokio::test]
async fn test_rewrap_provider_timeout() {
    let store = Arc::new(FaultyStore::new());
    let local = Arc::new(LocalMasterKeyProvider::generate());

    let setup = manager(
        store.clone(),
        MasterKeyProviders::new().with_provider(local.clone()),
    );
    let id = setup
        .create_key(CreateKeyOptions::new(MasterKey::local()))
        .await
        .unwrap();
    let before = setup.get_key(&KeyRef::Id(id)).await.unwrap();

    let config = ManagerConfig::default().with_timeouts(Timeouts {
        store: Duration::from_secs(5),
        provider: Duration::from_millis(20),
    });
    let slow = manager_with_config(
        store.clone(),
        slow_local_providers(local, Duration::from_millis(500)),
        config,
    );

    let err = slow.rewrap_key(&KeyRef::Id(id), None).await.unwrap_err();
    assert!(matches!(err, KeyVaultError::Timeout(_)));
    assert!(err.is_retryable());

    assert_eq!(store.updates(), 0);
    assert_eq!(store.find_by_id(id).await.unwrap(), Some(before));
}

/// Tests that cancelling a rewrap mid-flight leaves the key untouched.
#[tokio::test]
async fn test_rewrap_cancelled() {
    let store = Arc::new(FaultyStore::new());
    let local = Arc::new(LocalMasterKeyProvider::generate());

    let setup = manager(
        store.clone(),
        MasterKeyProviders::new().with_provider(local.clone()),
    );
    let id = setup
        .create_key(CreateKeyOptions::new(MasterKey::local()))
        .await
        .unwrap();
    let before = setup.get_key(&KeyRef::Id(id)).await.unwrap();

    let slow = manager(
        store.clone(),
        slow_local_providers(local, Duration::from_millis(200)),
    );
    let outcome =
        tokio::time::timeout(Duration::from_millis(50), slow.rewrap_key(&KeyRef::Id(id), None))
            .await;
    assert!(outcome.is_err());

    assert_eq!(store.updates(), 0);
    assert_eq!(setup.get_key(&KeyRef::Id(id)).await.unwrap(), before);

    // the per-key lock was released with the dropped future
    let version = slow.rewrap_key(&KeyRef::Id(id), None).await.unwrap();
    assert_eq!(version, before.version + 1);
}

/// Tests a bulk rewrap with a partial failure.
#[tokio::test]
async fn test_rewrap_all() {
    let client = Arc::new(FakeKmsClient::new());
    let providers = with_remote_providers(local_providers(), client.clone());
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), providers);

    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        ids.push(
            manager
                .create_key(CreateKeyOptions::new(MasterKey::local()).with_alt_name(name))
                .await
                .unwrap(),
        );
    }

    let summary = manager
        .rewrap_all(&KeyFilter::all(), Some(gcp_master_key()))
        .await
        .unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.rewrapped.len(), 3);
    assert!(summary.rewrapped.iter().all(|(_, version)| *version == 2));
    assert_eq!(
        manager
            .list_keys(&KeyFilter::all().with_provider(KmsProvider::Gcp))
            .await
            .unwrap()
            .len(),
        3
    );

    client.set_reject_credentials(true);
    let summary = manager
        .rewrap_all(&KeyFilter::all(), Some(MasterKey::local()))
        .await
        .unwrap();
    assert!(!summary.is_complete());
    assert_eq!(summary.failed.len(), 3);
    assert!(summary
        .failed
        .iter()
        .all(|(_, e)| matches!(e, KeyVaultError::ProviderAuthFailure(_))));
    let failed: Vec<_> = summary.failed.iter().map(|(id, _)| *id).collect();
    for id in &ids {
        assert!(failed.contains(id));
    }
}
