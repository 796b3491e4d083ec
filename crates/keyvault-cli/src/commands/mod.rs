//! CLI command definitions and implementations.

mod config_cmd;
mod crypt;
mod keys;
mod secrets;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Parser, Subcommand};
use colored::Colorize;
use keyvault_core::{KeyVaultError, KmsProvider, MasterKey};
use keyvault_crypto::{LocalMasterKeyProvider, MasterKeyProviders, SecureBytes};
use keyvault_engine::{EncryptionEngine, KeyManager};
use keyvault_store::FilesystemKeyVaultStore;
use tracing::debug;

use crate::config::Config;
use crate::output::{self, CliError, ErrorKind, OutputFormat};

pub use config_cmd::ConfigCommands;
pub use crypt::{DecryptCommand, EncryptCommand};
pub use keys::KeysCommands;
pub use secrets::SecretsCommands;

/// KeyVault CLI
///
/// Data key lifecycle management and explicit field encryption.
#[derive(Parser)]
#[command(name = "keyvault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Directory holding the key vault
    #[arg(long, env = "KEYVAULT_VAULT_DIR", global = true)]
    pub vault_dir: Option<PathBuf>,

    /// Local master key (base64, 32 bytes)
    #[arg(long, env = "KEYVAULT_MASTER_KEY", global = true, hide_env_values = true)]
    pub master_key: Option<String>,

    /// Passphrase to derive the local master key from
    #[arg(
        long,
        env = "KEYVAULT_PASSPHRASE",
        global = true,
        hide_env_values = true,
        conflicts_with = "master_key"
    )]
    pub passphrase: Option<String>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Configuration profile to use
    #[arg(long, short = 'P', global = true, default_value = "default")]
    pub profile: String,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Manage data keys
    #[command(alias = "key")]
    Keys(KeysCommands),

    /// Encrypt a value under a data key
    Encrypt(EncryptCommand),

    /// Decrypt a value
    Decrypt(DecryptCommand),

    /// Blue/green secret storage
    Secrets(SecretsCommands),

    /// CLI configuration management
    #[command(alias = "cfg")]
    Config(ConfigCommands),

    /// Display CLI version and build info
    Version,
}

impl Cli {
    /// Runs the CLI command.
    pub async fn run(self, config: Config) -> Result<(), CliError> {
        if self.no_color {
            colored::control::set_override(false);
        }

        let vault_dir = self
            .vault_dir
            .clone()
            .or_else(|| config.vault_dir.clone())
            .or_else(Config::default_vault_dir)
            .ok_or_else(|| {
                CliError::config("No vault directory configured. Set KEYVAULT_VAULT_DIR or use --vault-dir")
            })?;

        let ctx = Context {
            config,
            format: self.format,
            quiet: self.quiet,
            vault_dir,
            master_key: self.master_key,
            passphrase: self.passphrase,
        };

        match self.command {
            Commands::Keys(cmd) => cmd.run(&ctx).await,
            Commands::Encrypt(cmd) => cmd.run(&ctx).await,
            Commands::Decrypt(cmd) => cmd.run(&ctx).await,
            Commands::Secrets(cmd) => cmd.run(&ctx).await,
            Commands::Config(cmd) => cmd.run(&ctx, &self.profile),
            Commands::Version => {
                version(ctx.format);
                Ok(())
            }
        }
    }
}

/// Everything a command needs to reach the vault.
pub struct Context {
    pub config: Config,
    pub format: OutputFormat,
    pub quiet: bool,
    vault_dir: PathBuf,
    master_key: Option<String>,
    passphrase: Option<String>,
}

impl Context {
    /// Returns the vault directory.
    pub fn vault_dir(&self) -> &Path {
        &self.vault_dir
    }

    /// Builds the local provider from `--master-key` or `--passphrase`.
    pub fn local_provider(&self) -> Result<Option<LocalMasterKeyProvider>, CliError> {
        if let Some(ref encoded) = self.master_key {
            return decode_master_key(encoded).map(Some);
        }
        if let Some(ref passphrase) = self.passphrase {
            return passphrase_provider(passphrase, &self.config).map(Some);
        }
        Ok(None)
    }

    /// Builds the provider registry.
    ///
    /// Without a local master key, local documents can be listed and shown
    /// but not unwrapped.
    pub async fn providers(&self) -> Result<MasterKeyProviders, CliError> {
        let mut providers = MasterKeyProviders::new();
        match self.local_provider()? {
            Some(local) => providers.register(Arc::new(local)),
            None => debug!("No local master key supplied"),
        }

        #[cfg(feature = "aws-kms")]
        {
            use keyvault_crypto::kms::aws::AwsKmsClient;
            use keyvault_crypto::AwsMasterKeyProvider;

            let client = Arc::new(AwsKmsClient::new().await);
            providers.register(Arc::new(AwsMasterKeyProvider::new(client)));
        }

        Ok(providers)
    }

    /// Opens the key manager over the filesystem vault.
    pub async fn manager(&self) -> Result<Arc<KeyManager>, CliError> {
        let root = self.vault_dir.join("keys");
        let store = FilesystemKeyVaultStore::new(&root)
            .await
            .map_err(KeyVaultError::from)?;
        debug!(root = %root.display(), "Opened key vault");

        let providers = self.providers().await?;
        Ok(Arc::new(KeyManager::with_config(
            Arc::new(store),
            providers,
            self.config.manager_config(),
        )))
    }

    /// Opens the encryption engine over the filesystem vault.
    pub async fn engine(&self) -> Result<Arc<EncryptionEngine>, CliError> {
        Ok(Arc::new(EncryptionEngine::new(self.manager().await?)))
    }

    fn chatty(&self) -> bool {
        !self.quiet && !self.format.is_structured() && self.format != OutputFormat::Plain
    }

    /// Prints a status message unless output is structured or quiet.
    pub fn success(&self, message: &str) {
        if self.chatty() {
            output::success(message);
        }
    }

    /// Prints a follow-up hint unless output is structured or quiet.
    pub fn info(&self, message: &str) {
        if self.chatty() {
            output::info(message);
        }
    }

    /// Prints a warning to stderr unless quiet.
    pub fn warn(&self, message: &str) {
        if !self.quiet {
            output::warn(message);
        }
    }
}

/// Decodes a base64 local master key.
pub fn decode_master_key(encoded: &str) -> Result<LocalMasterKeyProvider, CliError> {
    let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
        CliError::with_cause(ErrorKind::Validation, "Master key is not valid base64", e)
    })?;
    LocalMasterKeyProvider::new(SecureBytes::new(bytes))
        .map_err(|e| CliError::with_cause(ErrorKind::Validation, "Invalid master key", e))
}

/// Derives a local master key from a passphrase and the configured salt.
pub fn passphrase_provider(
    passphrase: &str,
    config: &Config,
) -> Result<LocalMasterKeyProvider, CliError> {
    LocalMasterKeyProvider::from_passphrase(passphrase, config.salt())
        .map_err(|e| CliError::with_cause(ErrorKind::Validation, "Invalid passphrase", e))
}

/// Parses a value with its `FromStr` impl, mapping failures to CLI errors.
pub fn parse<T>(text: &str) -> Result<T, CliError>
where
    T: FromStr<Err = KeyVaultError>,
{
    text.parse().map_err(CliError::from)
}

/// Builds a master key binding from a provider name and `key=value` pairs.
pub fn master_key(provider: &str, meta: &[String]) -> Result<MasterKey, CliError> {
    let mut key = MasterKey::new(parse::<KmsProvider>(provider)?);
    for entry in meta {
        let (field, value) = entry.split_once('=').ok_or_else(|| {
            CliError::validation(format!("Invalid metadata '{entry}': expected key=value"))
        })?;
        key = key.with(field.trim(), value.trim());
    }
    Ok(key)
}

fn version(format: OutputFormat) {
    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    if format.is_structured() || format == OutputFormat::Plain {
        println!("{version}");
        return;
    }
    println!("{} {}", name.bold(), version);
    println!("Providers: local{}", if cfg!(feature = "aws-kms") { ", aws" } else { "" });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_master_key_metadata() {
        let key = master_key(
            "aws",
            &["region=us-east-1".into(), "key=arn:aws:kms:us-east-1:1:key/a".into()],
        )
        .unwrap();
        assert_eq!(key.provider, KmsProvider::Aws);
        assert_eq!(key.metadata["region"], "us-east-1");
        assert_eq!(key.metadata["key"], "arn:aws:kms:us-east-1:1:key/a");

        assert!(master_key("aws", &["region".into()]).is_err());
        assert!(master_key("vault", &[]).is_err());
    }

    #[test]
    fn test_decode_master_key() {
        let encoded = STANDARD.encode([7u8; 32]);
        assert!(decode_master_key(&encoded).is_ok());

        let short = STANDARD.encode([7u8; 16]);
        assert_eq!(decode_master_key(&short).unwrap_err().kind, ErrorKind::Validation);
        assert!(decode_master_key("not base64!").is_err());
    }

    #[test]
    fn test_global_flags_parse() {
        let cli = Cli::try_parse_from([
            "keyvault",
            "--vault-dir",
            "/tmp/vault",
            "-f",
            "json",
            "keys",
            "list",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.vault_dir, Some(PathBuf::from("/tmp/vault")));

        let conflict = Cli::try_parse_from([
            "keyvault",
            "--master-key",
            "a",
            "--passphrase",
            "b",
            "version",
        ]);
        assert!(conflict.is_err());
    }

    async fn run(dir: &Path, args: &[&str]) -> Result<(), CliError> {
        let key = STANDARD.encode([9u8; 32]);
        let mut argv = vec![
            "keyvault",
            "--vault-dir",
            dir.to_str().unwrap(),
            "--master-key",
            key.as_str(),
            "--quiet",
            "--format",
            "json",
        ];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().run(Config::default()).await
    }

    #[tokio::test]
    async fn test_key_lifecycle_commands() {
        let dir = tempfile::tempdir().unwrap();
        let vault = dir.path();

        run(vault, &["keys", "create", "-n", "orders"]).await.unwrap();
        run(vault, &["keys", "show", "orders"]).await.unwrap();
        run(vault, &["encrypt", "4111", "--key", "orders", "-a", "deterministic"])
            .await
            .unwrap();
        run(vault, &["keys", "rotate", "orders"]).await.unwrap();
        run(vault, &["keys", "list", "--status", "deprecated"]).await.unwrap();
        run(vault, &["keys", "rewrap-all"]).await.unwrap();

        let missing = run(vault, &["keys", "show", "invoices"]).await.unwrap_err();
        assert_eq!(missing.kind, ErrorKind::Vault);

        let duplicate = run(vault, &["keys", "create", "-n", "orders"]).await.unwrap_err();
        assert_eq!(duplicate.kind, ErrorKind::Vault);
    }

    #[tokio::test]
    async fn test_decrypt_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let error = run(dir.path(), &["decrypt", "AAAA"]).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let error = run(
            dir.path(),
            &["keys", "create", "--provider", "gcp", "-m", "projectId=p"],
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_secret_commands() {
        let dir = tempfile::tempdir().unwrap();
        let vault = dir.path();
        let keys = ["secrets", "--blue-key", "blue-pass", "--green-key", "green-pass"];
        let secrets = |args: &[&'static str]| -> Vec<&'static str> {
            keys.iter().chain(args).copied().collect()
        };

        run(vault, &secrets(&["init", "blue"])).await.unwrap();
        run(vault, &secrets(&["write", "db-password", "hunter2"])).await.unwrap();
        run(vault, &secrets(&["read", "db-password"])).await.unwrap();
        run(vault, &secrets(&["rotate", "green-pass-2"])).await.unwrap();

        let missing = run(vault, &secrets(&["read", "api-token"])).await.unwrap_err();
        assert_eq!(missing.kind, ErrorKind::Vault);
    }
}
