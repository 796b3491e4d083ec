//! Table rendering and the serializable views printed by commands.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use colored::Colorize;
use keyvault_core::{Color, FieldValue, KeyDocument, KeyId, KeyStatus};
use keyvault_engine::{RewrapSummary, VaultInfo};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Types that can be displayed as a single record.
pub trait TableDisplay: Serialize {
    /// Prints as labelled fields.
    fn print_table(&self);

    /// Prints the bare value for scripting.
    fn print_plain(&self);
}

/// Types that render as one row of a list.
pub trait TableRow: Serialize {
    /// Row type.
    type Row: Tabled;

    /// Builds the row.
    fn row(&self) -> Self::Row;

    /// Plain one-line rendering.
    fn plain(&self) -> String;
}

/// Renders rows as a rounded table.
pub fn render_table<R: Tabled>(rows: impl IntoIterator<Item = R>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string()
}

fn status_label(status: KeyStatus) -> colored::ColoredString {
    match status {
        KeyStatus::Active => "ACTIVE".green().bold(),
        KeyStatus::Deprecated => "DEPRECATED".yellow(),
    }
}

/// Key document without its wrapped key material.
#[derive(Debug, Clone, Serialize)]
pub struct KeyView {
    pub id: KeyId,
    pub status: KeyStatus,
    pub provider: String,
    pub master_key: BTreeMap<String, String>,
    pub alt_names: Vec<String>,
    pub version: u64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl From<&KeyDocument> for KeyView {
    fn from(doc: &KeyDocument) -> Self {
        Self {
            id: doc.id,
            status: doc.status,
            provider: doc.master_key.provider.to_string(),
            master_key: doc.master_key.metadata.clone(),
            alt_names: doc.key_alt_names.clone(),
            version: doc.version,
            created: doc.creation_date,
            updated: doc.update_date,
        }
    }
}

impl TableDisplay for KeyView {
    fn print_table(&self) {
        println!("{}: {}", "ID".bold(), self.id);
        println!("{}: {}", "Status".bold(), status_label(self.status));
        println!("{}: {}", "Provider".bold(), self.provider);
        for (field, value) in &self.master_key {
            println!("  {field}: {value}");
        }
        if !self.alt_names.is_empty() {
            println!("{}: {}", "Alt names".bold(), self.alt_names.join(", "));
        }
        println!("{}: {}", "Version".bold(), self.version);
        println!("{}: {}", "Created".bold(), timestamp(&self.created));
        println!("{}: {}", "Updated".bold(), timestamp(&self.updated));
    }

    fn print_plain(&self) {
        println!("{}", self.id);
    }
}

/// One row of `keys list`.
#[derive(Tabled)]
pub struct KeyRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PROVIDER")]
    provider: String,
    #[tabled(rename = "ALT NAMES")]
    alt_names: String,
    #[tabled(rename = "VERSION")]
    version: u64,
    #[tabled(rename = "UPDATED")]
    updated: String,
}

impl TableRow for KeyView {
    type Row = KeyRow;

    fn row(&self) -> KeyRow {
        KeyRow {
            id: self.id.to_string(),
            status: self.status.to_string(),
            provider: self.provider.clone(),
            alt_names: super::truncate(&self.alt_names.join(","), 32),
            version: self.version,
            updated: self.updated.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    fn plain(&self) -> String {
        format!("{}\t{}\t{}", self.id, self.status, self.alt_names.join(","))
    }
}

/// An encryption result.
#[derive(Debug, Clone, Serialize)]
pub struct CiphertextView {
    pub ciphertext: String,
    pub key_id: KeyId,
    pub algorithm: String,
    pub value_type: String,
}

impl CiphertextView {
    /// Builds the view from raw ciphertext bytes.
    pub fn new(bytes: &[u8], key_id: KeyId, algorithm: String, value_type: String) -> Self {
        Self {
            ciphertext: STANDARD.encode(bytes),
            key_id,
            algorithm,
            value_type,
        }
    }
}

impl TableDisplay for CiphertextView {
    fn print_table(&self) {
        println!("{}: {}", "Key".bold(), self.key_id);
        println!("{}: {}", "Algorithm".bold(), self.algorithm);
        println!("{}: {}", "Type".bold(), self.value_type);
        println!("{}: {}", "Ciphertext".bold(), self.ciphertext);
    }

    fn print_plain(&self) {
        println!("{}", self.ciphertext);
    }
}

/// A decrypted value.
#[derive(Debug, Clone, Serialize)]
pub struct ValueView {
    pub key_id: KeyId,
    #[serde(flatten)]
    pub value: FieldValue,
}

impl TableDisplay for ValueView {
    fn print_table(&self) {
        println!("{}: {}", "Key".bold(), self.key_id);
        println!("{}: {}", "Type".bold(), self.value.value_type());
        println!("{}: {}", "Value".bold(), self.value);
    }

    fn print_plain(&self) {
        println!("{}", self.value);
    }
}

/// A JSON document with some fields encrypted or decrypted.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct DocumentView(pub serde_json::Value);

impl TableDisplay for DocumentView {
    fn print_table(&self) {
        match serde_json::to_string_pretty(&self.0) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{}", self.0),
        }
    }

    fn print_plain(&self) {
        println!("{}", self.0);
    }
}

/// A stored secret.
#[derive(Debug, Clone, Serialize)]
pub struct SecretView {
    pub id: String,
    pub color: Color,
    pub secret: String,
}

impl TableDisplay for SecretView {
    fn print_table(&self) {
        println!("{}: {}", "Secret".bold(), self.id);
        println!("{}: {}", "Color".bold(), self.color);
        println!("{}: {}", "Value".bold(), self.secret);
    }

    fn print_plain(&self) {
        println!("{}", self.secret);
    }
}

/// Per-color summary row.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct SlotView {
    #[tabled(rename = "COLOR")]
    pub color: String,
    #[tabled(rename = "ACTIVE")]
    pub active: bool,
    #[tabled(rename = "KEYS")]
    pub keys: usize,
    #[tabled(rename = "SECRETS")]
    pub secrets: usize,
    #[tabled(rename = "PROVIDER")]
    pub provider: String,
}

/// Blue/green summary.
#[derive(Debug, Clone, Serialize)]
pub struct VaultInfoView {
    pub active: Option<Color>,
    pub slots: Vec<SlotView>,
}

impl From<&VaultInfo> for VaultInfoView {
    fn from(info: &VaultInfo) -> Self {
        Self {
            active: info.active,
            slots: info
                .slots
                .iter()
                .map(|slot| SlotView {
                    color: slot.color.to_string(),
                    active: info.active == Some(slot.color),
                    keys: slot.keys,
                    secrets: slot.secrets,
                    provider: slot.provider.to_string(),
                })
                .collect(),
        }
    }
}

impl TableDisplay for VaultInfoView {
    fn print_table(&self) {
        match self.active {
            Some(color) => println!("{}: {}", "Active".bold(), color.to_string().cyan().bold()),
            None => println!("{}: {}", "Active".bold(), "not initialized".dimmed()),
        }
        println!("{}", render_table(self.slots.iter().cloned()));
    }

    fn print_plain(&self) {
        if let Some(color) = self.active {
            println!("{color}");
        }
    }
}

/// Outcome of a bulk rewrap.
#[derive(Debug, Clone, Serialize)]
pub struct RewrapView {
    pub rewrapped: Vec<RewrappedKey>,
    pub failed: Vec<FailedKey>,
}

/// A rewrapped key.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct RewrappedKey {
    #[tabled(rename = "ID")]
    pub id: KeyId,
    #[tabled(rename = "VERSION")]
    pub version: u64,
}

/// A key that could not be rewrapped.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct FailedKey {
    #[tabled(rename = "ID")]
    pub id: KeyId,
    #[tabled(rename = "ERROR")]
    pub error: String,
}

impl From<&RewrapSummary> for RewrapView {
    fn from(summary: &RewrapSummary) -> Self {
        Self {
            rewrapped: summary
                .rewrapped
                .iter()
                .map(|(id, version)| RewrappedKey {
                    id: *id,
                    version: *version,
                })
                .collect(),
            failed: summary
                .failed
                .iter()
                .map(|(id, error)| FailedKey {
                    id: *id,
                    error: error.to_string(),
                })
                .collect(),
        }
    }
}

impl TableDisplay for RewrapView {
    fn print_table(&self) {
        if !self.rewrapped.is_empty() {
            println!("{}", render_table(self.rewrapped.iter().cloned()));
        }
        if !self.failed.is_empty() {
            println!("{}", "Failed:".red().bold());
            println!("{}", render_table(self.failed.iter().cloned()));
        }
    }

    fn print_plain(&self) {
        for key in &self.rewrapped {
            println!("{}\t{}", key.id, key.version);
        }
    }
}
