//! Key lifecycle integration tests.

use super::common::*;
use keyvault_core::{EncryptionAlgorithm, KeyRef, KeyStatus, KeyVaultError, MasterKey};
use keyvault_engine::{CreateKeyOptions, DeletePolicy, EncryptionRequest};
use keyvault_store::{FilesystemKeyVaultStore, InMemoryKeyVaultStore, KeyFilter};
use std::sync::Arc;
use tempfile::TempDir;

/// Tests that keys wrapped by every provider can be resolved and used.
#[tokio::test]
async fn test_every_provider_round_trip() {
    let client = Arc::new(FakeKmsClient::new());
    let providers = with_remote_providers(local_providers(), client.clone());
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), providers);
    let engine = engine(&manager);

    let master_keys = [
        MasterKey::local(),
        aws_master_key(),
        azure_master_key(),
        gcp_master_key(),
        kmip_master_key(),
    ];
    for master_key in master_keys {
        let provider = master_key.provider;
        let id = manager
            .create_key(CreateKeyOptions::new(master_key))
            .await
            .unwrap();

        let ciphertext = engine
            .encrypt(&EncryptionRequest::new(
                id,
                EncryptionAlgorithm::Random,
                format!("secret for {provider}"),
            ))
            .await
            .unwrap();
        let value = engine.decrypt(&ciphertext).await.unwrap();
        assert_eq!(value.as_str(), Some(format!("secret for {provider}").as_str()));
    }

    // four remote keys, each wrapped once and unwrapped twice
    assert_eq!(client.calls(), 12);
}

/// Tests that remote master keys must carry their required metadata.
#[tokio::test]
async fn test_remote_master_key_requires_metadata() {
    let providers = with_remote_providers(local_providers(), Arc::new(FakeKmsClient::new()));
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), providers);

    let incomplete = MasterKey::new(keyvault_core::KmsProvider::Aws).with("region", "eu-west-1");
    let result = manager.create_key(CreateKeyOptions::new(incomplete)).await;
    assert!(matches!(result, Err(KeyVaultError::InvalidRequest(_))));
    assert!(manager.list_keys(&KeyFilter::all()).await.unwrap().is_empty());
}

/// Tests that a master key without a registered provider is rejected.
#[tokio::test]
async fn test_unconfigured_provider() {
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), local_providers());
    let result = manager
        .create_key(CreateKeyOptions::new(gcp_master_key()))
        .await;
    assert!(matches!(result, Err(KeyVaultError::ProviderNotConfigured(_))));
}

/// Tests rotation of a named key: old ciphertexts stay readable and the
/// name moves to the successor.
#[tokio::test]
async fn test_patient_ssn_rotation() {
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), local_providers());
    let engine = engine(&manager);

    let k1 = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()).with_alt_name("patient-ssn"))
        .await
        .unwrap();
    let request = EncryptionRequest::new(
        KeyRef::alt_name("patient-ssn"),
        EncryptionAlgorithm::Deterministic,
        "123-45-6789",
    );
    let before = engine.encrypt(&request).await.unwrap();
    assert_eq!(
        engine.decrypt(&before).await.unwrap().as_str(),
        Some("123-45-6789")
    );

    let k2 = manager
        .rotate_key(&KeyRef::alt_name("patient-ssn"))
        .await
        .unwrap();
    assert_ne!(k1, k2);

    let old = manager.get_key(&KeyRef::Id(k1)).await.unwrap();
    assert_eq!(old.status, KeyStatus::Deprecated);
    assert_eq!(old.version, 2);
    let new = manager.get_key(&KeyRef::alt_name("patient-ssn")).await.unwrap();
    assert_eq!(new.id, k2);
    assert!(new.is_active());
    assert_eq!(new.master_key, old.master_key);

    assert_eq!(
        engine.decrypt(&before).await.unwrap().as_str(),
        Some("123-45-6789")
    );
    assert_eq!(engine.key_id_of(&before).unwrap(), k1);

    let after = engine.encrypt(&request).await.unwrap();
    assert_eq!(engine.key_id_of(&after).unwrap(), k2);
    assert_ne!(before, after);
}

/// Tests that only the active successor can be rotated.
#[tokio::test]
async fn test_rotate_deprecated_key_is_rejected() {
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), local_providers());
    let k1 = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()))
        .await
        .unwrap();
    manager.rotate_key(&KeyRef::Id(k1)).await.unwrap();

    let result = manager.rotate_key(&KeyRef::Id(k1)).await;
    assert!(matches!(result, Err(KeyVaultError::InvalidState(_))));
}

/// Tests that a rotated key only decrypts; new values go to its successor.
#[tokio::test]
async fn test_deprecated_key_refuses_new_encryptions() {
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), local_providers());
    let engine = engine(&manager);
    let k1 = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()).with_alt_name("orders"))
        .await
        .unwrap();
    let before = engine
        .encrypt(&EncryptionRequest::new(k1, EncryptionAlgorithm::Random, "order-1"))
        .await
        .unwrap();

    let k2 = manager.rotate_key(&KeyRef::Id(k1)).await.unwrap();

    let result = engine
        .encrypt(&EncryptionRequest::new(k1, EncryptionAlgorithm::Random, "order-2"))
        .await;
    assert!(matches!(result, Err(KeyVaultError::InvalidState(_))));
    assert_eq!(engine.decrypt(&before).await.unwrap().as_str(), Some("order-1"));

    let after = engine
        .encrypt(&EncryptionRequest::new(
            KeyRef::alt_name("orders"),
            EncryptionAlgorithm::Random,
            "order-2",
        ))
        .await
        .unwrap();
    assert_eq!(engine.key_id_of(&after).unwrap(), k2);
}

/// Tests that a failed successor insert leaves the original key active.
#[tokio::test]
async fn test_rotate_rolls_back_when_insert_fails() {
    let store = Arc::new(FaultyStore::new());
    let manager = manager(store.clone(), local_providers());
    let id = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()).with_alt_name("orders"))
        .await
        .unwrap();

    store.set_fail_inserts(true);
    let result = manager.rotate_key(&KeyRef::alt_name("orders")).await;
    assert!(matches!(result, Err(KeyVaultError::StorageUnavailable(_))));

    let doc = manager.get_key(&KeyRef::alt_name("orders")).await.unwrap();
    assert_eq!(doc.id, id);
    assert!(doc.is_active());
    assert_eq!(manager.list_keys(&KeyFilter::all()).await.unwrap().len(), 1);
}

/// Tests that concurrent creates with one alternate name admit one winner.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_same_alt_name() {
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), local_providers());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .create_key(CreateKeyOptions::new(MasterKey::local()).with_alt_name("billing"))
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => assert!(matches!(e, KeyVaultError::AltNameConflict(ref n) if n == "billing")),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(
        manager
            .list_keys(&KeyFilter::all().with_alt_name("billing"))
            .await
            .unwrap()
            .len(),
        1
    );
}

/// Tests alternate name management.
#[tokio::test]
async fn test_alt_name_management() {
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), local_providers());
    let a = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()).with_alt_name("a"))
        .await
        .unwrap();
    let b = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()))
        .await
        .unwrap();

    let result = manager.add_alt_name(&KeyRef::Id(b), "a").await;
    assert!(matches!(result, Err(KeyVaultError::AltNameConflict(_))));

    let doc = manager.add_alt_name(&KeyRef::Id(a), "alias").await.unwrap();
    assert_eq!(doc.key_alt_names, vec!["a".to_string(), "alias".to_string()]);
    assert_eq!(doc.version, 2);

    let doc = manager
        .remove_alt_name(&KeyRef::alt_name("alias"), "a")
        .await
        .unwrap();
    assert_eq!(doc.key_alt_names, vec!["alias".to_string()]);

    manager.add_alt_name(&KeyRef::Id(b), "a").await.unwrap();
    assert_eq!(manager.get_key(&KeyRef::alt_name("a")).await.unwrap().id, b);
}

/// Tests that deleting a key makes its ciphertexts undecryptable.
#[tokio::test]
async fn test_delete_key() {
    let manager = manager(Arc::new(InMemoryKeyVaultStore::new()), local_providers());
    let engine = engine(&manager);
    let id = manager
        .create_key(CreateKeyOptions::new(MasterKey::local()))
        .await
        .unwrap();
    let ciphertext = engine
        .encrypt(&EncryptionRequest::new(id, EncryptionAlgorithm::Random, 42i64))
        .await
        .unwrap();

    manager
        .delete_key_with(&KeyRef::Id(id), DeletePolicy::Force)
        .await
        .unwrap();

    assert!(matches!(
        engine.decrypt(&ciphertext).await,
        Err(KeyVaultError::UnknownKey(missing)) if missing == id
    ));
    assert!(matches!(
        manager.delete_key(&KeyRef::Id(id)).await,
        Err(KeyVaultError::KeyNotFound(_))
    ));
}

/// Tests the filesystem backend across reopen.
#[tokio::test]
async fn test_filesystem_backend_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let providers = local_providers();

    let ciphertext = {
        let store = FilesystemKeyVaultStore::new(dir.path()).await.unwrap();
        let manager = manager(Arc::new(store), providers.clone());
        let engine = engine(&manager);
        manager
            .create_key(CreateKeyOptions::new(MasterKey::local()).with_alt_name("patients"))
            .await
            .unwrap();
        let ciphertext = engine
            .encrypt(&EncryptionRequest::new(
                KeyRef::alt_name("patients"),
                EncryptionAlgorithm::Deterministic,
                "Jane Doe",
            ))
            .await
            .unwrap();
        manager
            .rotate_key(&KeyRef::alt_name("patients"))
            .await
            .unwrap();
        ciphertext
    };

    let store = FilesystemKeyVaultStore::new(dir.path()).await.unwrap();
    let manager = manager(Arc::new(store), providers);
    let engine = engine(&manager);

    let docs = manager.list_keys(&KeyFilter::all()).await.unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].status, KeyStatus::Deprecated);
    assert_eq!(docs[1].status, KeyStatus::Active);
    assert_eq!(
        manager
            .list_keys(&KeyFilter::all().with_status(KeyStatus::Active))
            .await
            .unwrap()
            .len(),
        1
    );

    assert_eq!(
        engine.decrypt(&ciphertext).await.unwrap().as_str(),
        Some("Jane Doe")
    );
}
