//! Blue/green secret storage commands.
//!
//! Layout under the vault directory: `secrets/` holds both colors' secret
//! copies, `blue/` and `green/` hold each color's key vault. Each color's
//! local master key is derived from its own passphrase.

use std::sync::Arc;

use clap::{Args, Subcommand};
use keyvault_core::{Color, EncryptionAlgorithm, KeyVaultError, MasterKey};
use keyvault_crypto::MasterKeyProviders;
use keyvault_engine::{SecretService, Slot};
use keyvault_store::{FilesystemKeyVaultStore, FilesystemSecretStore, SecretStore};
use tracing::debug;

use crate::output::{print_output, CliError, SecretView, VaultInfoView};

use super::{parse, passphrase_provider, Context};

/// Blue/green secret storage commands.
#[derive(Args)]
pub struct SecretsCommands {
    /// Passphrase for the blue master key
    #[arg(long, env = "KEYVAULT_BLUE_KEY", hide_env_values = true)]
    pub blue_key: Option<String>,

    /// Passphrase for the green master key
    #[arg(long, env = "KEYVAULT_GREEN_KEY", hide_env_values = true)]
    pub green_key: Option<String>,

    #[command(subcommand)]
    pub command: SecretsSubcommand,
}

/// Secret subcommands.
#[derive(Subcommand)]
pub enum SecretsSubcommand {
    /// Reset both colors and activate one of them
    Init {
        /// Color readers start on
        #[arg(default_value = "blue")]
        active: String,
    },

    /// Show both colors
    #[command(alias = "status")]
    Info,

    /// Store a secret in both colors
    Write {
        /// Secret id
        id: String,

        /// Secret value
        secret: String,

        /// Algorithm: deterministic or random
        #[arg(long, short, default_value = "random")]
        algorithm: String,
    },

    /// Read a secret
    Read {
        /// Secret id
        id: String,

        /// Read from this color instead of the active one
        #[arg(long, short)]
        color: Option<String>,
    },

    /// Move the inactive color to a new master key and copy every secret
    Rotate {
        /// Passphrase for the inactive color's new master key
        #[arg(env = "KEYVAULT_NEW_KEY", hide_env_values = true)]
        new_key: String,

        /// Algorithm for the re-encrypted copies
        #[arg(long, short, default_value = "random")]
        algorithm: String,
    },

    /// Switch readers to a color
    Activate {
        /// Color to activate
        color: String,
    },
}

impl SecretsCommands {
    /// Runs the secrets command.
    pub async fn run(self, ctx: &Context) -> Result<(), CliError> {
        let mut service = self.open(ctx).await?;

        match self.command {
            SecretsSubcommand::Init { active } => {
                let active = parse::<Color>(&active)?;
                service.initialize(active).await?;
                ctx.success(&format!("Secret storage initialized; {active} is active"));
                Ok(())
            }

            SecretsSubcommand::Info => {
                let info = service.info().await?;
                print_output(&VaultInfoView::from(&info), ctx.format)
            }

            SecretsSubcommand::Write {
                id,
                secret,
                algorithm,
            } => {
                let algorithm = parse::<EncryptionAlgorithm>(&algorithm)?;
                service.write(&id, &secret, algorithm).await?;
                ctx.success(&format!("Secret '{id}' written to both colors"));
                Ok(())
            }

            SecretsSubcommand::Read { id, color } => {
                let color = match color {
                    Some(c) => parse::<Color>(&c)?,
                    None => service.active().await?,
                };
                let secret = service.read_from(color, &id).await?;
                print_output(&SecretView { id, color, secret }, ctx.format)
            }

            SecretsSubcommand::Rotate { new_key, algorithm } => {
                let algorithm = parse::<EncryptionAlgorithm>(&algorithm)?;
                let providers = MasterKeyProviders::new()
                    .with_provider(Arc::new(passphrase_provider(&new_key, &ctx.config)?));

                let rotated = service
                    .rotate(providers, MasterKey::local(), algorithm)
                    .await?;
                let target = service.active().await?.flip();
                ctx.success(&format!("Rotated {rotated} secrets into {target}"));
                ctx.info(&format!(
                    "Pass the new passphrase as --{color}-key, then run `keyvault secrets activate {color}`",
                    color = target.as_str()
                ));
                Ok(())
            }

            SecretsSubcommand::Activate { color } => {
                let color = parse::<Color>(&color)?;
                service.activate(color).await?;
                ctx.success(&format!("{color} is now active"));
                Ok(())
            }
        }
    }

    async fn open(&self, ctx: &Context) -> Result<SecretService, CliError> {
        let root = ctx.vault_dir();
        let secrets: Arc<dyn SecretStore> = Arc::new(
            FilesystemSecretStore::new(root.join("secrets"))
                .await
                .map_err(KeyVaultError::from)?,
        );

        let blue = open_slot(ctx, Color::Blue, self.blue_key.as_deref()).await?;
        let green = open_slot(ctx, Color::Green, self.green_key.as_deref()).await?;
        Ok(SecretService::new(secrets, blue, green)?)
    }
}

async fn open_slot(ctx: &Context, color: Color, passphrase: Option<&str>) -> Result<Slot, CliError> {
    let store = FilesystemKeyVaultStore::new(ctx.vault_dir().join(color.as_str()))
        .await
        .map_err(KeyVaultError::from)?;

    let mut providers = MasterKeyProviders::new();
    match passphrase {
        Some(passphrase) => {
            providers.register(Arc::new(passphrase_provider(passphrase, &ctx.config)?));
        }
        None => debug!(color = %color, "No passphrase supplied"),
    }

    Ok(Slot::new(color, Arc::new(store), providers, MasterKey::local())
        .with_config(ctx.config.manager_config()))
}
