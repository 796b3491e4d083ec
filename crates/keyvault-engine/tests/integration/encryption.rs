//! End-to-end encryption tests.

use super::common::*;
use chrono::{TimeZone, Utc};
use keyvault_core::{EncryptionAlgorithm, FieldValue, KeyRef, KeyVaultError, MasterKey};
use keyvault_crypto::{LocalMasterKeyProvider, MasterKeyProviders};
use keyvault_engine::{
    CacheConfig, CreateKeyOptions, DeletePolicy, EncryptionRequest, KeyManager, ManagerConfig,
};
use keyvault_store::InMemoryKeyVaultStore;
use std::sync::Arc;
use std::time::Duration;

/// Tests every value type through both algorithms where allowed.
#[tokio::test]
async fn test_value_types() {
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), local_providers());
    let engine = engine(&manager);
    let id = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()))
        .await
        .unwrap();

    let values = [
        FieldValue::String("héllo wörld".to_string()),
        FieldValue::String(String::new()),
        FieldValue::Int32(-17),
        FieldValue::Int64(i64::MAX),
        FieldValue::Double(98.6),
        FieldValue::Boolean(true),
        FieldValue::Binary(vec![0, 1, 2, 255]),
        FieldValue::DateTime(Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap()),
    ];

    for value in values {
        let deterministic = value.value_type().supports_deterministic();
        for algorithm in [EncryptionAlgorithm::Deterministic, EncryptionAlgorithm::Random] {
            let request = EncryptionRequest::new(id, algorithm, value.clone());
            let result = engine.encrypt(&request).await;
            if algorithm == EncryptionAlgorithm::Deterministic && !deterministic {
                assert!(matches!(result, Err(KeyVaultError::InvalidRequest(_))));
                continue;
            }
            let ciphertext = result.unwrap();
            assert_eq!(engine.decrypt(&ciphertext).await.unwrap(), value);
        }
    }
}

/// Tests that every single-byte modification is detected.
#[tokio::test]
async fn test_single_byte_tamper_detection() {
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), local_providers());
    let engine = engine(&manager);
    let id = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()))
        .await
        .unwrap();
    let ciphertext = engine
        .encrypt(&EncryptionRequest::new(
            id,
            EncryptionAlgorithm::Random,
            "4111 1111 1111 1111",
        ))
        .await
        .unwrap();

    for i in 0..ciphertext.len() {
        let mut tampered = ciphertext.clone();
        tampered[i] ^= 0x01;
        let err = engine.decrypt(&tampered).await.unwrap_err();
        match i {
            0 => assert!(matches!(err, KeyVaultError::UnsupportedAlgorithm(_))),
            1..=16 => assert!(matches!(err, KeyVaultError::UnknownKey(_))),
            _ => assert!(
                matches!(err, KeyVaultError::AuthenticationFailure),
                "byte {i}: {err}"
            ),
        }
    }
}

/// Tests that flipping the algorithm tag to the other known algorithm is
/// detected.
#[tokio::test]
async fn test_algorithm_swap_detection() {
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), local_providers());
    let engine = engine(&manager);
    let id = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()))
        .await
        .unwrap();
    let mut ciphertext = engine
        .encrypt(&EncryptionRequest::new(id, EncryptionAlgorithm::Deterministic, 7i32))
        .await
        .unwrap();

    ciphertext[0] = EncryptionAlgorithm::Random.tag();
    assert!(matches!(
        engine.decrypt(&ciphertext).await,
        Err(KeyVaultError::AuthenticationFailure)
    ));
}

/// Tests that a different master key cannot unwrap the data key.
#[tokio::test]
async fn test_wrong_master_key() {
    let store = Arc::new(InMemoryKeyVaultStore::new());
    let writer = manager(store.clone(), passphrase_providers("correct horse"));
    let id = writer
        .create_key(CreateKeyOptions::new(MasterKey::local()))
        .await
        .unwrap();
    let ciphertext = engine(&writer)
        .encrypt(&EncryptionRequest::new(id, EncryptionAlgorithm::Random, "x"))
        .await
        .unwrap();

    let reader = manager(store, passphrase_providers("battery staple"));
    let err = engine(&reader).decrypt(&ciphertext).await.unwrap_err();
    assert!(matches!(err, KeyVaultError::AuthenticationFailure));
    assert!(err.is_security_incident());
}

/// Tests that the data key cache serves repeated lookups and is
/// invalidated by rotation.
#[tokio::test]
async fn test_cache_hits_and_invalidation() {
    let config = ManagerConfig::default().with_cache(CacheConfig {
        capacity: 16,
        ttl: Duration::from_secs(60),
    });
    let manager = manager_with_config(
        Arc::new(InMemoryKeyVaultStore::new()),
        local_providers(),
        config,
    );
    let engine = engine(&manager);
    let id = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()).with_alt_name("cards"))
        .await
        .unwrap();

    let ciphertext = engine
        .encrypt(&EncryptionRequest::new(id, EncryptionAlgorithm::Random, 1i64))
        .await
        .unwrap();
    for _ in 0..3 {
        engine.decrypt(&ciphertext).await.unwrap();
    }
    let stats = manager.cache_stats().unwrap();
    assert!(stats.hits >= 3);
    assert_eq!(stats.entries, 1);

    manager.rotate_key(&KeyRef::Id(id)).await.unwrap();
    assert_eq!(manager.cache_stats().unwrap().entries, 0);
    assert_eq!(engine.decrypt(&ciphertext).await.unwrap(), FieldValue::Int64(1));

    manager.shutdown();
    assert_eq!(manager.cache_stats().unwrap().entries, 0);
}

/// Key manager with a cache whose provider takes 200ms per unwrap, over a
/// store holding one fresh local key.
async fn slow_cached_manager() -> (Arc<KeyManager>, keyvault_core::KeyId) {
    let store = Arc::new(InMemoryKeyVaultStore::new());
    let local = Arc::new(LocalMasterKeyProvider::generate());
    let setup = manager(
        store.clone(),
        MasterKeyProviders::new().with_provider(local.clone()),
    );
    let id = setup
        .create_key(CreateKeyOptions::new(MasterKey::local()).with_alt_name("cards"))
        .await
        .unwrap();

    let config = ManagerConfig::default().with_cache(CacheConfig {
        capacity: 16,
        ttl: Duration::from_secs(60),
    });
    let slow = MasterKeyProviders::new().with_provider(Arc::new(SlowProvider::slow_unwraps(
        local,
        Duration::from_millis(200),
    )));
    (manager_with_config(store, slow, config), id)
}

/// Tests that a key deleted while it is being unwrapped does not linger in
/// the cache.
#[tokio::test]
async fn test_delete_during_resolve_is_not_cached() {
    let (manager, id) = slow_cached_manager().await;

    let resolving = tokio::spawn({
        let manager = manager.clone();
        async move { manager.resolve_key(&KeyRef::Id(id)).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager
        .delete_key_with(&KeyRef::Id(id), DeletePolicy::Force)
        .await
        .unwrap();

    assert!(resolving.await.unwrap().is_ok());
    assert_eq!(manager.cache_stats().unwrap().entries, 0);
    assert!(matches!(
        manager.resolve_key(&KeyRef::Id(id)).await,
        Err(KeyVaultError::KeyNotFound(_))
    ));
}

/// Tests that a key rotated while it is being unwrapped is not cached as
/// active.
#[tokio::test]
async fn test_rotate_during_resolve_is_not_cached() {
    let (manager, id) = slow_cached_manager().await;
    let engine = engine(&manager);

    let resolving = tokio::spawn({
        let manager = manager.clone();
        async move { manager.resolve_key(&KeyRef::Id(id)).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.rotate_key(&KeyRef::Id(id)).await.unwrap();

    resolving.await.unwrap().unwrap();
    let result = engine
        .encrypt(&EncryptionRequest::new(id, EncryptionAlgorithm::Random, 7i64))
        .await;
    assert!(matches!(result, Err(KeyVaultError::InvalidState(_))));
}
