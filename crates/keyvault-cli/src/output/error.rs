//! CLI error types and handling.

use std::process::ExitCode;

use colored::Colorize;
use keyvault_core::KeyVaultError;

/// CLI error type.
#[derive(Debug)]
pub struct CliError {
    /// Error kind.
    pub kind: ErrorKind,
    /// Error message.
    pub message: String,
    /// Underlying cause.
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration error.
    Config,
    /// Key vault operation rejected.
    Vault,
    /// Master key provider rejected the credentials.
    Auth,
    /// Invalid input.
    Validation,
    /// IO error.
    Io,
    /// Output/formatting error.
    Output,
    /// Ciphertext failed authentication.
    Security,
    /// Transient failure; the command can be retried.
    Retryable,
    /// Internal error.
    Internal,
}

impl CliError {
    /// Creates a new CLI error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Creates a new CLI error with a cause.
    pub fn with_cause<E>(kind: ErrorKind, message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Creates an output error.
    pub fn output(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Output, message)
    }

    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self.kind {
            ErrorKind::Vault => ExitCode::from(1),
            ErrorKind::Config => ExitCode::from(2),
            ErrorKind::Auth => ExitCode::from(3),
            ErrorKind::Validation => ExitCode::from(4),
            ErrorKind::Io => ExitCode::from(5),
            ErrorKind::Output => ExitCode::from(6),
            ErrorKind::Security => ExitCode::from(7),
            ErrorKind::Retryable => ExitCode::from(75),
            ErrorKind::Internal => ExitCode::from(255),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref cause) = self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<KeyVaultError> for CliError {
    fn from(error: KeyVaultError) -> Self {
        let kind = if error.is_retryable() {
            ErrorKind::Retryable
        } else {
            match &error {
                KeyVaultError::AuthenticationFailure => ErrorKind::Security,
                KeyVaultError::ProviderAuthFailure(_) => ErrorKind::Auth,
                KeyVaultError::ProviderNotConfigured(_) => ErrorKind::Config,
                KeyVaultError::InvalidRequest(_)
                | KeyVaultError::InvalidCiphertext(_)
                | KeyVaultError::UnsupportedAlgorithm(_) => ErrorKind::Validation,
                KeyVaultError::Crypto(_) => ErrorKind::Internal,
                _ => ErrorKind::Vault,
            }
        };

        Self::new(kind, format!("[{}] {error}", error.code()))
    }
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::with_cause(ErrorKind::Io, "IO error", error)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_cause(ErrorKind::Output, "JSON error", error)
    }
}

impl From<toml::de::Error> for CliError {
    fn from(error: toml::de::Error) -> Self {
        Self::with_cause(ErrorKind::Config, "Configuration error", error)
    }
}

/// Prints an error to stderr.
pub fn print_error(error: &CliError) {
    let prefix = match error.kind {
        ErrorKind::Config => "Configuration error",
        ErrorKind::Vault => "Key vault error",
        ErrorKind::Auth => "Provider authentication error",
        ErrorKind::Validation => "Validation error",
        ErrorKind::Io => "IO error",
        ErrorKind::Output => "Output error",
        ErrorKind::Security => "Decryption failed",
        ErrorKind::Retryable => "Temporary failure",
        ErrorKind::Internal => "Internal error",
    };

    eprintln!("{} {}", format!("{prefix}:").red().bold(), error.message);

    if let Some(ref cause) = error.cause {
        eprintln!("  {}", format!("Caused by: {cause}").dimmed());
    }

    match error.kind {
        ErrorKind::Security => {
            eprintln!();
            eprintln!("{}", "Hint: are you using the correct key?".dimmed());
            eprintln!(
                "{}",
                "  Check KEYVAULT_MASTER_KEY / KEYVAULT_PASSPHRASE or --blue-key / --green-key"
                    .dimmed()
            );
        }
        ErrorKind::Auth => {
            eprintln!();
            eprintln!(
                "{}",
                "Hint: check the credentials of the master key provider.".dimmed()
            );
        }
        ErrorKind::Config => {
            eprintln!();
            eprintln!("{}", "Hint: inspect the active configuration with:".dimmed());
            eprintln!("{}", "  keyvault config show".dimmed());
        }
        ErrorKind::Retryable => {
            eprintln!();
            eprintln!("{}", "Hint: the operation can be retried.".dimmed());
        }
        _ => {}
    }
}
