//! Blue/green secret storage.
//!
//! Every secret is stored twice, once per [`Color`], each copy encrypted
//! under that color's data key. Readers use the active color. Rotating the
//! master key rebuilds the inactive color from the active one; activating
//! it afterwards switches readers over without downtime.

use crate::ciphertext;
use crate::config::{DeletePolicy, ManagerConfig};
use crate::engine::{EncryptionEngine, EncryptionRequest};
use crate::manager::{CreateKeyOptions, KeyManager, ReferenceChecker};
use async_trait::async_trait;
use keyvault_core::{
    Color, EncryptionAlgorithm, FieldValue, KeyId, KeyRef, KeyVaultError, KeyVaultResult,
    KmsProvider, MasterKey,
};
use keyvault_crypto::MasterKeyProviders;
use keyvault_store::{KeyFilter, KeyVaultStore, SecretRecord, SecretStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Alternate name of each color's data key.
pub const DATA_KEY_ALT_NAME: &str = "dek";

/// Counts stored secrets whose ciphertext names a data key.
#[derive(Clone)]
pub struct SecretReferenceChecker {
    secrets: Arc<dyn SecretStore>,
}

impl SecretReferenceChecker {
    /// Creates a checker over `secrets`.
    #[must_use]
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl ReferenceChecker for SecretReferenceChecker {
    async fn count_references(&self, id: KeyId) -> KeyVaultResult<u64> {
        let mut references = 0;
        for color in Color::ALL {
            for record in self.secrets.list(color).await? {
                match ciphertext::key_id_of(&record.ciphertext) {
                    Ok(key_id) if key_id == id => references += 1,
                    Ok(_) => {}
                    Err(e) => debug!(secret_id = %record.id, error = %e, "Skipping unreadable secret"),
                }
            }
        }
        Ok(references)
    }
}

impl std::fmt::Debug for SecretReferenceChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretReferenceChecker").finish_non_exhaustive()
    }
}

/// One color: a key vault, its master key and the engine built over them.
pub struct Slot {
    color: Color,
    store: Arc<dyn KeyVaultStore>,
    providers: MasterKeyProviders,
    master_key: MasterKey,
    config: ManagerConfig,
    reference_checker: Option<Arc<dyn ReferenceChecker>>,
    engine: Arc<EncryptionEngine>,
}

impl Slot {
    /// Creates a slot over `store`, wrapping data keys with `master_key`.
    #[must_use]
    pub fn new(
        color: Color,
        store: Arc<dyn KeyVaultStore>,
        providers: MasterKeyProviders,
        master_key: MasterKey,
    ) -> Self {
        let config = ManagerConfig::default();
        let engine = build_engine(&store, &providers, &config, None);
        Self {
            color,
            store,
            providers,
            master_key,
            config,
            reference_checker: None,
            engine,
        }
    }

    /// Sets the key manager configuration.
    #[must_use]
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self.rebuild();
        self
    }

    /// Returns the slot color.
    #[must_use]
    pub fn color(&self) -> Color {
        self.color
    }

    /// Returns the master key used for new data keys.
    #[must_use]
    pub fn master_key(&self) -> &MasterKey {
        &self.master_key
    }

    /// Returns the slot's key manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<KeyManager> {
        self.engine.key_manager()
    }

    /// Returns the slot's encryption engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<EncryptionEngine> {
        &self.engine
    }

    fn rebuild(&mut self) {
        self.engine.key_manager().shutdown();
        self.engine = build_engine(
            &self.store,
            &self.providers,
            &self.config,
            self.reference_checker.clone(),
        );
    }

    fn replace_master_key(&mut self, providers: MasterKeyProviders, master_key: MasterKey) {
        self.providers = providers;
        self.master_key = master_key;
        self.rebuild();
    }

    /// Deletes every key in the vault and creates a fresh data key.
    async fn reset(&self) -> KeyVaultResult<KeyId> {
        let manager = self.manager();
        for doc in manager.list_keys(&KeyFilter::all()).await? {
            manager
                .delete_key_with(&KeyRef::Id(doc.id), DeletePolicy::Force)
                .await?;
        }
        let id = manager
            .create_key(
                CreateKeyOptions::new(self.master_key.clone()).with_alt_name(DATA_KEY_ALT_NAME),
            )
            .await?;
        info!(color = %self.color, key_id = %id, "Key vault reset");
        Ok(id)
    }

    async fn encrypt(&self, secret: &str, algorithm: EncryptionAlgorithm) -> KeyVaultResult<Vec<u8>> {
        let request = EncryptionRequest::new(
            KeyRef::alt_name(DATA_KEY_ALT_NAME),
            algorithm,
            FieldValue::from(secret),
        );
        self.engine.encrypt(&request).await
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> KeyVaultResult<String> {
        match self.engine.decrypt(ciphertext).await? {
            FieldValue::String(secret) => Ok(secret),
            other => Err(KeyVaultError::InvalidCiphertext(format!(
                "expected a string secret, found {}",
                other.value_type()
            ))),
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("color", &self.color)
            .field("store", &self.store.name())
            .field("master_key", &self.master_key)
            .finish_non_exhaustive()
    }
}

fn build_engine(
    store: &Arc<dyn KeyVaultStore>,
    providers: &MasterKeyProviders,
    config: &ManagerConfig,
    reference_checker: Option<Arc<dyn ReferenceChecker>>,
) -> Arc<EncryptionEngine> {
    let mut manager = KeyManager::with_config(store.clone(), providers.clone(), config.clone());
    if let Some(checker) = reference_checker {
        manager = manager.with_reference_checker(checker);
    }
    Arc::new(EncryptionEngine::new(Arc::new(manager)))
}

/// Per-color summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    /// Slot color.
    pub color: Color,
    /// Key documents in the color's vault.
    pub keys: usize,
    /// Secrets stored for the color.
    pub secrets: usize,
    /// Provider of the color's master key.
    pub provider: KmsProvider,
}

/// Summary of both colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultInfo {
    /// Active color, if initialized.
    pub active: Option<Color>,
    /// Blue then green.
    pub slots: Vec<SlotInfo>,
}

/// Blue/green secret service.
pub struct SecretService {
    blue: Slot,
    green: Slot,
    secrets: Arc<dyn SecretStore>,
}

impl SecretService {
    /// Creates a service over two slots and a secret store.
    ///
    /// Deleting a data key through either slot's manager is refused while
    /// stored secrets still reference it.
    pub fn new(secrets: Arc<dyn SecretStore>, blue: Slot, green: Slot) -> KeyVaultResult<Self> {
        if blue.color != Color::Blue || green.color != Color::Green {
            return Err(KeyVaultError::InvalidRequest(
                "slots must be passed as blue then green".to_string(),
            ));
        }

        let checker: Arc<dyn ReferenceChecker> =
            Arc::new(SecretReferenceChecker::new(secrets.clone()));
        let mut service = Self {
            blue,
            green,
            secrets,
        };
        for color in Color::ALL {
            let slot = service.slot_mut(color);
            slot.reference_checker = Some(checker.clone());
            slot.rebuild();
        }
        Ok(service)
    }

    /// Returns the slot for `color`.
    #[must_use]
    pub fn slot(&self, color: Color) -> &Slot {
        match color {
            Color::Blue => &self.blue,
            Color::Green => &self.green,
        }
    }

    fn slot_mut(&mut self, color: Color) -> &mut Slot {
        match color {
            Color::Blue => &mut self.blue,
            Color::Green => &mut self.green,
        }
    }

    /// Resets both vaults, drops every secret and activates `active`.
    pub async fn initialize(&self, active: Color) -> KeyVaultResult<()> {
        for color in Color::ALL {
            let dropped = self.secrets.clear(color).await?;
            self.slot(color).reset().await?;
            debug!(color = %color, dropped, "Color initialized");
        }
        self.secrets.set_active_color(active).await?;
        info!(active = %active, "Secret service initialized");
        Ok(())
    }

    /// Encrypts `secret` under each color's data key and stores both copies.
    pub async fn write(
        &self,
        id: &str,
        secret: &str,
        algorithm: EncryptionAlgorithm,
    ) -> KeyVaultResult<()> {
        if id.is_empty() {
            return Err(KeyVaultError::InvalidRequest(
                "secret id must not be empty".to_string(),
            ));
        }
        for color in Color::ALL {
            let ciphertext = self.slot(color).encrypt(secret, algorithm).await?;
            self.secrets
                .upsert(color, SecretRecord::new(id, ciphertext))
                .await?;
        }
        debug!(secret_id = %id, "Secret written");
        Ok(())
    }

    /// Reads a secret from the active color.
    pub async fn read(&self, id: &str) -> KeyVaultResult<String> {
        self.read_from(self.active().await?, id).await
    }

    /// Reads a secret from `color`.
    pub async fn read_from(&self, color: Color, id: &str) -> KeyVaultResult<String> {
        let record = self
            .secrets
            .get(color, id)
            .await?
            .ok_or_else(|| KeyVaultError::NotFound(format!("secret '{id}' in {color}")))?;
        self.slot(color).decrypt(&record.ciphertext).await
    }

    /// Returns the active color.
    pub async fn active(&self) -> KeyVaultResult<Color> {
        self.secrets.active_color().await?.ok_or_else(|| {
            KeyVaultError::InvalidState("no active color; initialize the service first".to_string())
        })
    }

    /// Switches readers to `color`.
    pub async fn activate(&self, color: Color) -> KeyVaultResult<()> {
        self.slot(color)
            .manager()
            .get_key(&KeyRef::alt_name(DATA_KEY_ALT_NAME))
            .await
            .map_err(|e| match e {
                KeyVaultError::KeyNotFound(_) => {
                    KeyVaultError::InvalidState(format!("{color} has no data key"))
                }
                other => other,
            })?;
        self.secrets.set_active_color(color).await?;
        info!(active = %color, "Color activated");
        Ok(())
    }

    /// Moves the inactive color to a new master key and re-encrypts every
    /// active secret into it. Returns the number of secrets rotated.
    ///
    /// The active color is read but never modified, so readers are
    /// unaffected until the rotated color is activated.
    pub async fn rotate(
        &mut self,
        providers: MasterKeyProviders,
        master_key: MasterKey,
        algorithm: EncryptionAlgorithm,
    ) -> KeyVaultResult<u64> {
        let active = self.active().await?;
        let inactive = active.flip();

        let records = self.secrets.list(active).await?;
        self.secrets.clear(inactive).await?;
        self.slot_mut(inactive).replace_master_key(providers, master_key);
        self.slot(inactive).reset().await?;

        let mut count = 0;
        for record in records {
            let secret = self
                .slot(active)
                .decrypt(&record.ciphertext)
                .await
                .map_err(|e| {
                    if matches!(e, KeyVaultError::AuthenticationFailure) {
                        warn!(secret_id = %record.id, color = %active, "Secret failed authentication during rotation");
                    }
                    e
                })?;
            let ciphertext = self.slot(inactive).encrypt(&secret, algorithm).await?;
            self.secrets
                .upsert(inactive, SecretRecord::new(record.id, ciphertext))
                .await?;
            count += 1;
        }

        info!(color = %inactive, count, "Secrets rotated");
        Ok(count)
    }

    /// Summarizes both colors.
    pub async fn info(&self) -> KeyVaultResult<VaultInfo> {
        let active = self.secrets.active_color().await?;
        let mut slots = Vec::with_capacity(Color::ALL.len());
        for color in Color::ALL {
            let slot = self.slot(color);
            slots.push(SlotInfo {
                color,
                keys: slot.manager().list_keys(&KeyFilter::all()).await?.len(),
                secrets: self.secrets.list(color).await?.len(),
                provider: slot.master_key.provider,
            });
        }
        Ok(VaultInfo { active, slots })
    }
}

impl std::fmt::Debug for SecretService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretService")
            .field("blue", &self.blue)
            .field("green", &self.green)
            .finish_non_exhaustive()
    }
}
