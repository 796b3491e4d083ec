//! Output formatting and display utilities.

mod error;
mod format;
mod table;

pub use error::{print_error, CliError, ErrorKind};
pub use format::OutputFormat;
pub use table::{
    render_table, CiphertextView, DocumentView, KeyView, RewrapView, SecretView, TableDisplay,
    TableRow, ValueView, VaultInfoView,
};

use colored::Colorize;
use serde::Serialize;

/// Prints a success message.
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Prints an info message.
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Prints a warning message.
pub fn warn(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

fn serialize<T: Serialize + ?Sized>(data: &T, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(data)
            .map_err(|e| CliError::output(format!("Failed to serialize JSON: {e}"))),
        OutputFormat::JsonCompact => serde_json::to_string(data)
            .map_err(|e| CliError::output(format!("Failed to serialize JSON: {e}"))),
        OutputFormat::Yaml => serde_yaml::to_string(data)
            .map_err(|e| CliError::output(format!("Failed to serialize YAML: {e}"))),
        OutputFormat::Table | OutputFormat::Plain => Err(CliError::output(format!(
            "{format} is not a serialized format"
        ))),
    }
}

/// Prints a single record in the selected format.
pub fn print_output<T: TableDisplay>(data: &T, format: OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Table => data.print_table(),
        OutputFormat::Plain => data.print_plain(),
        OutputFormat::Yaml => print!("{}", serialize(data, format)?),
        OutputFormat::Json | OutputFormat::JsonCompact => println!("{}", serialize(data, format)?),
    }
    Ok(())
}

/// Prints a list of records in the selected format.
pub fn print_list<T: TableRow>(items: &[T], format: OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Table => println!("{}", render_table(items.iter().map(T::row))),
        OutputFormat::Plain => {
            for item in items {
                println!("{}", item.plain());
            }
        }
        OutputFormat::Yaml => print!("{}", serialize(items, format)?),
        OutputFormat::Json | OutputFormat::JsonCompact => {
            println!("{}", serialize(items, format)?);
        }
    }
    Ok(())
}

/// Truncates a string to a maximum length with ellipsis.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}
