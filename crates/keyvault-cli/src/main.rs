//! KeyVault CLI
//!
//! Command-line interface for data key lifecycle management, explicit
//! field encryption and blue/green secret storage.

#![forbid(unsafe_code)]

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;
mod output;

use commands::Cli;
use config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.profile) {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&e);
            return e.exit_code();
        }
    };

    init_logging(&config, cli.verbose, cli.quiet);

    match cli.run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&e);
            e.exit_code()
        }
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over the profile level.
fn init_logging(config: &Config, verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        config.log_level.as_deref().unwrap_or("warn")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.json_logs() {
        builder.json().init();
    } else {
        builder.compact().without_time().init();
    }
}
