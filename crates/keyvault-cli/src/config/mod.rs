//! CLI configuration management.
//!
//! Profiles live in the platform config directory as `config.toml` (the
//! `default` profile) or `<profile>.toml`. `KEYVAULT_*` environment
//! variables override file values; command-line flags override both.
//! Master keys and passphrases are never read from or written to a profile.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use keyvault_engine::{CacheConfig, DeletePolicy, ManagerConfig, Timeouts};
use serde::{Deserialize, Serialize};

use crate::output::{CliError, ErrorKind};

/// Salt used for passphrase-derived master keys when none is configured.
pub const DEFAULT_PASSPHRASE_SALT: &str = "keyvault/passphrase/v1";

/// Keys accepted by `config set`, `config unset` and `KEYVAULT_*` variables.
pub const KEYS: &[&str] = &[
    "vault_dir",
    "log_level",
    "log_format",
    "store_timeout_secs",
    "provider_timeout_secs",
    "cache_ttl_secs",
    "cache_capacity",
    "passphrase_salt",
    "require_unreferenced_delete",
];

/// CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the key vault and secret stores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_dir: Option<PathBuf>,

    /// Default log filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Log format: `compact` or `json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,

    /// Deadline for a key vault store call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_timeout_secs: Option<u64>,

    /// Deadline for a master key provider call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_timeout_secs: Option<u64>,

    /// Data key cache TTL; caching is off unless set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,

    /// Data key cache capacity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<usize>,

    /// Salt for passphrase-derived master keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase_salt: Option<String>,

    /// Refuse to delete keys still referenced by stored secrets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_unreferenced_delete: Option<bool>,
}

impl Config {
    /// Returns the configuration directory.
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "keyvault", "keyvault").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns the default vault directory.
    pub fn default_vault_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "keyvault", "keyvault").map(|dirs| dirs.data_dir().join("vault"))
    }

    /// Returns the path to a profile's configuration file.
    pub fn profile_path(profile: &str) -> Option<PathBuf> {
        Self::config_dir().map(|dir| {
            if profile == "default" {
                dir.join("config.toml")
            } else {
                dir.join(format!("{profile}.toml"))
            }
        })
    }

    /// Loads a profile and applies `KEYVAULT_*` overrides.
    pub fn load(profile: &str) -> Result<Self, CliError> {
        let mut config = Self::load_file(profile)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Loads a profile without environment overrides.
    pub fn load_file(profile: &str) -> Result<Self, CliError> {
        let path = Self::profile_path(profile)
            .ok_or_else(|| CliError::config("Could not determine config directory"))?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            CliError::with_cause(
                ErrorKind::Config,
                format!("Failed to read config file: {}", path.display()),
                e,
            )
        })?;

        Self::parse(&content)
    }

    /// Parses a profile file.
    pub fn parse(content: &str) -> Result<Self, CliError> {
        toml::from_str(content).map_err(|e| {
            CliError::with_cause(ErrorKind::Config, "Failed to parse configuration", e)
        })
    }

    /// Saves configuration to a profile.
    pub fn save(&self, profile: &str) -> Result<PathBuf, CliError> {
        let path = Self::profile_path(profile)
            .ok_or_else(|| CliError::config("Could not determine config directory"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CliError::with_cause(ErrorKind::Io, "Failed to create config directory", e)
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            CliError::with_cause(ErrorKind::Config, "Failed to serialize configuration", e)
        })?;

        std::fs::write(&path, content).map_err(|e| {
            CliError::with_cause(
                ErrorKind::Io,
                format!("Failed to write config file: {}", path.display()),
                e,
            )
        })?;

        Ok(path)
    }

    /// Applies `KEYVAULT_<KEY>` overrides found by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), CliError> {
        for key in KEYS {
            let name = format!("KEYVAULT_{}", key.to_uppercase());
            if let Some(value) = lookup(&name) {
                self.set(key, &value)
                    .map_err(|e| CliError::config(format!("{name}: {}", e.message)))?;
            }
        }
        Ok(())
    }

    /// Sets a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), CliError> {
        fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CliError> {
            value
                .parse()
                .map_err(|_| CliError::validation(format!("Invalid value for {key}: {value}")))
        }

        match key {
            "vault_dir" => self.vault_dir = Some(PathBuf::from(value)),
            "log_level" => self.log_level = Some(value.to_string()),
            "log_format" => match value {
                "compact" | "json" => self.log_format = Some(value.to_string()),
                _ => {
                    return Err(CliError::validation(format!(
                        "Invalid log format: {value} (compact or json)"
                    )))
                }
            },
            "store_timeout_secs" => self.store_timeout_secs = Some(number(key, value)?),
            "provider_timeout_secs" => self.provider_timeout_secs = Some(number(key, value)?),
            "cache_ttl_secs" => self.cache_ttl_secs = Some(number(key, value)?),
            "cache_capacity" => self.cache_capacity = Some(number(key, value)?),
            "passphrase_salt" => self.passphrase_salt = Some(value.to_string()),
            "require_unreferenced_delete" => {
                self.require_unreferenced_delete = Some(number(key, value)?);
            }
            _ => return Err(CliError::validation(format!("Unknown configuration key: {key}"))),
        }
        Ok(())
    }

    /// Gets a configuration value.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "vault_dir" => self.vault_dir.as_ref().map(|p| p.display().to_string()),
            "log_level" => self.log_level.clone(),
            "log_format" => self.log_format.clone(),
            "store_timeout_secs" => self.store_timeout_secs.map(|v| v.to_string()),
            "provider_timeout_secs" => self.provider_timeout_secs.map(|v| v.to_string()),
            "cache_ttl_secs" => self.cache_ttl_secs.map(|v| v.to_string()),
            "cache_capacity" => self.cache_capacity.map(|v| v.to_string()),
            "passphrase_salt" => self.passphrase_salt.clone(),
            "require_unreferenced_delete" => self.require_unreferenced_delete.map(|v| v.to_string()),
            _ => None,
        }
    }

    /// Removes a configuration value.
    pub fn unset(&mut self, key: &str) -> Result<(), CliError> {
        match key {
            "vault_dir" => self.vault_dir = None,
            "log_level" => self.log_level = None,
            "log_format" => self.log_format = None,
            "store_timeout_secs" => self.store_timeout_secs = None,
            "provider_timeout_secs" => self.provider_timeout_secs = None,
            "cache_ttl_secs" => self.cache_ttl_secs = None,
            "cache_capacity" => self.cache_capacity = None,
            "passphrase_salt" => self.passphrase_salt = None,
            "require_unreferenced_delete" => self.require_unreferenced_delete = None,
            _ => return Err(CliError::validation(format!("Unknown configuration key: {key}"))),
        }
        Ok(())
    }

    /// Returns the passphrase salt.
    pub fn salt(&self) -> &[u8] {
        self.passphrase_salt
            .as_deref()
            .unwrap_or(DEFAULT_PASSPHRASE_SALT)
            .as_bytes()
    }

    /// Returns true if logs should be JSON.
    pub fn json_logs(&self) -> bool {
        self.log_format.as_deref() == Some("json")
    }

    /// Builds the key manager configuration.
    pub fn manager_config(&self) -> ManagerConfig {
        let defaults = Timeouts::default();
        let mut config = ManagerConfig::default().with_timeouts(Timeouts {
            store: self
                .store_timeout_secs
                .map_or(defaults.store, Duration::from_secs),
            provider: self
                .provider_timeout_secs
                .map_or(defaults.provider, Duration::from_secs),
        });

        if let Some(ttl) = self.cache_ttl_secs {
            let defaults = CacheConfig::default();
            config = config.with_cache(CacheConfig {
                capacity: self.cache_capacity.unwrap_or(defaults.capacity),
                ttl: Duration::from_secs(ttl),
            });
        }

        if self.require_unreferenced_delete == Some(false) {
            config = config.with_delete_policy(DeletePolicy::Force);
        }
        config
    }
}
