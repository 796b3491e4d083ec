//! Data key management commands.

use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Args, Subcommand};
use keyvault_core::{KeyRef, KeyStatus, KmsProvider};
use keyvault_crypto::{SecureBytes, AES_256_KEY_SIZE};
use keyvault_engine::{CreateKeyOptions, DeletePolicy};
use keyvault_store::KeyFilter;

use crate::output::{print_list, print_output, CliError, ErrorKind, KeyView, RewrapView};

use super::{master_key, parse, Context};

/// Data key management commands.
#[derive(Args)]
pub struct KeysCommands {
    #[command(subcommand)]
    pub command: KeysSubcommand,
}

/// Data key subcommands.
#[derive(Subcommand)]
pub enum KeysSubcommand {
    /// Create a new data key
    Create {
        /// Alternate name (repeatable)
        #[arg(long = "alt-name", short = 'n')]
        alt_names: Vec<String>,

        /// Master key provider (local, aws, azure, gcp, kmip)
        #[arg(long, default_value = "local")]
        provider: String,

        /// Master key metadata (key=value, repeatable)
        #[arg(long, short = 'm')]
        meta: Vec<String>,
    },

    /// List data keys
    #[command(alias = "ls")]
    List {
        /// Filter by status (active, deprecated)
        #[arg(long, short)]
        status: Option<String>,

        /// Filter by master key provider
        #[arg(long)]
        provider: Option<String>,

        /// Filter by alternate name
        #[arg(long)]
        alt_name: Option<String>,
    },

    /// Show a data key
    #[command(alias = "get")]
    Show {
        /// Key id or alternate name
        key: String,
    },

    /// Replace a key with a fresh one under the same master key
    Rotate {
        /// Key id or alternate name
        key: String,
    },

    /// Re-encrypt a key under another master key
    Rewrap {
        /// Key id or alternate name
        key: String,

        /// Target provider (default: the key's current master key)
        #[arg(long)]
        provider: Option<String>,

        /// Target master key metadata (key=value, repeatable)
        #[arg(long, short = 'm', requires = "provider")]
        meta: Vec<String>,
    },

    /// Re-encrypt every matching key under another master key
    #[command(name = "rewrap-all")]
    RewrapAll {
        /// Target provider (default: each key's current master key)
        #[arg(long)]
        provider: Option<String>,

        /// Target master key metadata (key=value, repeatable)
        #[arg(long, short = 'm', requires = "provider")]
        meta: Vec<String>,

        /// Only rewrap keys currently wrapped by this provider
        #[arg(long)]
        from_provider: Option<String>,
    },

    /// Delete a data key
    #[command(alias = "rm")]
    Delete {
        /// Key id or alternate name
        key: String,

        /// Skip the reference check
        #[arg(long)]
        force: bool,
    },

    /// Add an alternate name to a key
    #[command(name = "add-alt-name")]
    AddAltName {
        /// Key id or alternate name
        key: String,

        /// Name to add
        name: String,
    },

    /// Remove an alternate name from a key
    #[command(name = "remove-alt-name")]
    RemoveAltName {
        /// Key id or alternate name
        key: String,

        /// Name to remove
        name: String,
    },

    /// Print a new random local master key (base64)
    #[command(name = "generate-master-key")]
    GenerateMasterKey,
}

impl KeysCommands {
    /// Runs the keys command.
    pub async fn run(self, ctx: &Context) -> Result<(), CliError> {
        match self.command {
            KeysSubcommand::GenerateMasterKey => generate_master_key(),
            command => run_with_manager(command, ctx).await,
        }
    }
}

async fn run_with_manager(command: KeysSubcommand, ctx: &Context) -> Result<(), CliError> {
    let manager = ctx.manager().await?;

    match command {
        KeysSubcommand::Create {
            alt_names,
            provider,
            meta,
        } => {
            let mut options = CreateKeyOptions::new(master_key(&provider, &meta)?);
            options.alt_names = alt_names;

            let id = manager.create_key(options).await?;
            let doc = manager.get_key(&KeyRef::Id(id)).await?;

            ctx.success(&format!("Data key created: {id}"));
            print_output(&KeyView::from(&doc), ctx.format)
        }

        KeysSubcommand::List {
            status,
            provider,
            alt_name,
        } => {
            let mut filter = KeyFilter::all();
            if let Some(s) = status {
                filter = filter.with_status(parse::<KeyStatus>(&s)?);
            }
            if let Some(p) = provider {
                filter = filter.with_provider(parse::<KmsProvider>(&p)?);
            }
            if let Some(n) = alt_name {
                filter = filter.with_alt_name(n);
            }

            let views: Vec<KeyView> = manager
                .list_keys(&filter)
                .await?
                .iter()
                .map(KeyView::from)
                .collect();
            print_list(&views, ctx.format)
        }

        KeysSubcommand::Show { key } => {
            let doc = manager.get_key(&parse::<KeyRef>(&key)?).await?;
            print_output(&KeyView::from(&doc), ctx.format)
        }

        KeysSubcommand::Rotate { key } => {
            let key = parse::<KeyRef>(&key)?;
            let new_id = manager.rotate_key(&key).await?;
            let doc = manager.get_key(&KeyRef::Id(new_id)).await?;

            ctx.success(&format!("Rotated {key}; new data key {new_id}"));
            print_output(&KeyView::from(&doc), ctx.format)
        }

        KeysSubcommand::Rewrap {
            key,
            provider,
            meta,
        } => {
            let key = parse::<KeyRef>(&key)?;
            let target = provider.map(|p| master_key(&p, &meta)).transpose()?;

            manager.rewrap_key(&key, target).await?;
            let doc = manager.get_key(&key).await?;

            ctx.success(&format!(
                "Rewrapped {key} under {} (version {})",
                doc.master_key.provider, doc.version
            ));
            print_output(&KeyView::from(&doc), ctx.format)
        }

        KeysSubcommand::RewrapAll {
            provider,
            meta,
            from_provider,
        } => {
            let target = provider.map(|p| master_key(&p, &meta)).transpose()?;
            let mut filter = KeyFilter::all();
            if let Some(p) = from_provider {
                filter = filter.with_provider(parse::<KmsProvider>(&p)?);
            }

            let summary = manager.rewrap_all(&filter, target).await?;
            print_output(&RewrapView::from(&summary), ctx.format)?;

            if summary.is_complete() {
                ctx.success(&format!("Rewrapped {} keys", summary.rewrapped.len()));
                Ok(())
            } else {
                Err(CliError::new(
                    ErrorKind::Vault,
                    format!(
                        "{} of {} keys could not be rewrapped",
                        summary.failed.len(),
                        summary.failed.len() + summary.rewrapped.len()
                    ),
                ))
            }
        }

        KeysSubcommand::Delete { key, force } => {
            let key = parse::<KeyRef>(&key)?;
            if force {
                manager.delete_key_with(&key, DeletePolicy::Force).await?;
            } else {
                manager.delete_key(&key).await?;
            }
            ctx.success(&format!("Data key {key} deleted"));
            ctx.warn("Values encrypted under this key can no longer be decrypted");
            Ok(())
        }

        KeysSubcommand::AddAltName { key, name } => {
            let doc = manager.add_alt_name(&parse::<KeyRef>(&key)?, &name).await?;
            ctx.success(&format!("Added alternate name '{name}'"));
            print_output(&KeyView::from(&doc), ctx.format)
        }

        KeysSubcommand::RemoveAltName { key, name } => {
            let doc = manager
                .remove_alt_name(&parse::<KeyRef>(&key)?, &name)
                .await?;
            ctx.success(&format!("Removed alternate name '{name}'"));
            print_output(&KeyView::from(&doc), ctx.format)
        }

        KeysSubcommand::GenerateMasterKey => generate_master_key(),
    }
}

fn generate_master_key() -> Result<(), CliError> {
    let key = SecureBytes::random(AES_256_KEY_SIZE);
    println!("{}", STANDARD.encode(key.as_slice()));
    Ok(())
}
