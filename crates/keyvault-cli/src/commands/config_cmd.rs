//! Configuration management commands.

use clap::{Args, Subcommand};
use colored::Colorize;

use crate::config::{Config, KEYS};
use crate::output::{print_output, CliError, TableDisplay};

use super::Context;

/// Configuration management commands.
#[derive(Args)]
pub struct ConfigCommands {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective configuration (file plus environment)
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Set a configuration value in the profile file
    Set {
        /// Configuration key
        key: String,

        /// Configuration value
        value: String,
    },

    /// Remove a configuration value from the profile file
    Unset {
        /// Configuration key
        key: String,
    },

    /// Show configuration file location
    Path,
}

impl TableDisplay for Config {
    fn print_table(&self) {
        for key in KEYS {
            match self.get(key) {
                Some(value) => println!("{}: {}", key.cyan(), value),
                None => println!("{}: {}", key.cyan(), "(not set)".dimmed()),
            }
        }
    }

    fn print_plain(&self) {
        for key in KEYS {
            if let Some(value) = self.get(key) {
                println!("{key}={value}");
            }
        }
    }
}

impl ConfigCommands {
    /// Runs the config command.
    pub fn run(self, ctx: &Context, profile: &str) -> Result<(), CliError> {
        match self.command {
            ConfigSubcommand::Show => {
                if !ctx.format.is_structured() {
                    println!(
                        "{}",
                        format!("Configuration (profile: {profile})").bold().underline()
                    );
                    println!("{}: {}", "vault_dir (effective)".cyan(), ctx.vault_dir().display());
                    println!();
                }
                print_output(&ctx.config, ctx.format)
            }

            ConfigSubcommand::Get { key } => {
                if !KEYS.contains(&key.as_str()) {
                    return Err(CliError::validation(format!(
                        "Unknown configuration key: {key}"
                    )));
                }
                match ctx.config.get(&key) {
                    Some(value) => println!("{value}"),
                    None => println!("{}", "(not set)".dimmed()),
                }
                Ok(())
            }

            ConfigSubcommand::Set { key, value } => {
                let mut config = Config::load_file(profile)?;
                config.set(&key, &value)?;
                let path = config.save(profile)?;
                ctx.success(&format!("Set {key} in {}", path.display()));
                Ok(())
            }

            ConfigSubcommand::Unset { key } => {
                let mut config = Config::load_file(profile)?;
                config.unset(&key)?;
                let path = config.save(profile)?;
                ctx.success(&format!("Removed {key} from {}", path.display()));
                Ok(())
            }

            ConfigSubcommand::Path => {
                let path = Config::profile_path(profile)
                    .ok_or_else(|| CliError::config("Could not determine config path"))?;
                println!("{}", path.display());
                Ok(())
            }
        }
    }
}
