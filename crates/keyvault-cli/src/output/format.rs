//! Output format options.

use std::str::FromStr;

use clap::ValueEnum;

/// How command results are rendered on stdout.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables and key/value listings.
    #[default]
    Table,
    /// Pretty-printed JSON.
    Json,
    /// Single-line JSON.
    #[value(name = "json-compact")]
    JsonCompact,
    /// YAML.
    Yaml,
    /// Bare values, one per line, for shell pipelines.
    Plain,
}

impl OutputFormat {
    /// Returns true for machine-readable formats, which suppress status
    /// messages on stdout.
    pub fn is_structured(self) -> bool {
        matches!(self, Self::Json | Self::JsonCompact | Self::Yaml)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Table => "table",
            Self::Json => "json",
            Self::JsonCompact => "json-compact",
            Self::Yaml => "yaml",
            Self::Plain => "plain",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
            .map_err(|_| format!("unknown output format '{s}' (table, json, json-compact, yaml, plain)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "json-compact".parse::<OutputFormat>().unwrap(),
            OutputFormat::JsonCompact
        );
        assert!("xml".parse::<OutputFormat>().is_err());
        assert!(OutputFormat::Yaml.is_structured());
        assert!(!OutputFormat::Plain.is_structured());
    }
}
