//! Blue/green secret service integration tests.

use super::common::*;
use keyvault_core::{Color, EncryptionAlgorithm, KeyVaultError, KmsProvider, MasterKey};
use keyvault_engine::{SecretService, Slot};
use keyvault_store::{FilesystemKeyVaultStore, FilesystemSecretStore};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

async fn open_service(root: &Path, blue_key: &str, green_key: &str) -> SecretService {
    let secrets = FilesystemSecretStore::new(root.join("secrets")).await.unwrap();
    let mut slots = Vec::new();
    for (color, passphrase) in [(Color::Blue, blue_key), (Color::Green, green_key)] {
        let store = FilesystemKeyVaultStore::new(root.join(format!("{}_vault", color.as_str())))
            .await
            .unwrap();
        slots.push(Slot::new(
            color,
            Arc::new(store),
            passphrase_providers(passphrase),
            MasterKey::local(),
        ));
    }
    let green = slots.pop().unwrap();
    let blue = slots.pop().unwrap();
    SecretService::new(Arc::new(secrets), blue, green).unwrap()
}

/// Tests a full master key rotation across process restarts.
#[tokio::test]
async fn test_blue_green_rotation() {
    let dir = TempDir::new().unwrap();

    {
        let service = open_service(dir.path(), "passwordBLUE", "passwordGREEN").await;
        service.initialize(Color::Blue).await.unwrap();
        service
            .write("db-password", "hunter2", EncryptionAlgorithm::Deterministic)
            .await
            .unwrap();
        service
            .write("api-token", "tok_live_abc", EncryptionAlgorithm::Random)
            .await
            .unwrap();
    }

    {
        let mut service = open_service(dir.path(), "passwordBLUE", "passwordGREEN").await;
        assert_eq!(service.active().await.unwrap(), Color::Blue);
        assert_eq!(service.read("db-password").await.unwrap(), "hunter2");

        let rotated = service
            .rotate(
                passphrase_providers("passwordGREEN2"),
                MasterKey::local(),
                EncryptionAlgorithm::Deterministic,
            )
            .await
            .unwrap();
        assert_eq!(rotated, 2);
        service.activate(Color::Green).await.unwrap();
    }

    // the old green passphrase no longer unwraps the green data key
    let stale = open_service(dir.path(), "passwordBLUE", "passwordGREEN").await;
    let err = stale.read("api-token").await.unwrap_err();
    assert!(matches!(err, KeyVaultError::AuthenticationFailure));

    let service = open_service(dir.path(), "passwordBLUE", "passwordGREEN2").await;
    assert_eq!(service.active().await.unwrap(), Color::Green);
    assert_eq!(service.read("api-token").await.unwrap(), "tok_live_abc");
    assert_eq!(
        service.read_from(Color::Blue, "db-password").await.unwrap(),
        "hunter2"
    );

    let info = service.info().await.unwrap();
    assert_eq!(info.active, Some(Color::Green));
    assert_eq!(info.slots.len(), 2);
    for slot in &info.slots {
        assert_eq!(slot.keys, 1);
        assert_eq!(slot.secrets, 2);
        assert_eq!(slot.provider, KmsProvider::Local);
    }
}

/// Tests that rotation only reads the active color.
#[tokio::test]
async fn test_rotation_with_wrong_active_key_fails() {
    let dir = TempDir::new().unwrap();
    {
        let service = open_service(dir.path(), "passwordBLUE", "passwordGREEN").await;
        service.initialize(Color::Blue).await.unwrap();
        service
            .write("db-password", "hunter2", EncryptionAlgorithm::Random)
            .await
            .unwrap();
    }

    let mut service = open_service(dir.path(), "wrongBLUE", "passwordGREEN").await;
    let err = service
        .rotate(
            passphrase_providers("passwordGREEN2"),
            MasterKey::local(),
            EncryptionAlgorithm::Random,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, KeyVaultError::AuthenticationFailure));

    // blue is untouched and still readable with the right key
    let service = open_service(dir.path(), "passwordBLUE", "passwordGREEN").await;
    assert_eq!(service.read("db-password").await.unwrap(), "hunter2");
}
