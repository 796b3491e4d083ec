//! Explicit encryption and decryption commands.

use std::io::Read;

use base64::{engine::general_purpose::STANDARD, Engine};
use clap::Args;
use keyvault_core::{EncryptionAlgorithm, FieldValue, KeyRef, ValueType};
use keyvault_engine::{DocumentEncryptor, EncryptionRequest};

use crate::output::{print_output, CiphertextView, CliError, DocumentView, ErrorKind, ValueView};

use super::{parse, Context};

/// Encrypt a value, or fields of a JSON document, under a data key.
#[derive(Args)]
pub struct EncryptCommand {
    /// Value to encrypt, or `-` to read it from stdin
    pub value: String,

    /// Data key id or alternate name
    #[arg(long, short)]
    pub key: String,

    /// Algorithm: deterministic or random
    #[arg(long, short)]
    pub algorithm: String,

    /// Value type (string, int32, int64, double, boolean, binary, datetime)
    #[arg(long = "type", short = 't', default_value = "string")]
    pub value_type: String,

    /// Treat the value as a JSON document and encrypt these field paths
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,
}

impl EncryptCommand {
    /// Runs the encrypt command.
    pub async fn run(self, ctx: &Context) -> Result<(), CliError> {
        let key = parse::<KeyRef>(&self.key)?;
        let algorithm = parse::<EncryptionAlgorithm>(&self.algorithm)?;
        let input = read_input(&self.value)?;
        let engine = ctx.engine().await?;

        if !self.fields.is_empty() {
            let document = parse_document(&input)?;
            let paths: Vec<&str> = self.fields.iter().map(String::as_str).collect();
            let encrypted = DocumentEncryptor::new(engine)
                .encrypt_fields(document, &paths, &key, algorithm)
                .await?;
            return print_output(&DocumentView(encrypted), ctx.format);
        }

        let value_type = parse::<ValueType>(&self.value_type)?;
        let value = FieldValue::parse(value_type, &input)?;
        let ciphertext = engine
            .encrypt(&EncryptionRequest::new(key, algorithm, value))
            .await?;
        let key_id = engine.key_id_of(&ciphertext)?;

        print_output(
            &CiphertextView::new(
                &ciphertext,
                key_id,
                algorithm.to_string(),
                value_type.to_string(),
            ),
            ctx.format,
        )
    }
}

/// Decrypt a value, or encrypted fields of a JSON document.
#[derive(Args)]
pub struct DecryptCommand {
    /// Base64 ciphertext, or `-` to read it from stdin
    pub ciphertext: String,

    /// Treat the input as a JSON document and decrypt these field paths
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,
}

impl DecryptCommand {
    /// Runs the decrypt command.
    pub async fn run(self, ctx: &Context) -> Result<(), CliError> {
        let input = read_input(&self.ciphertext)?;
        let engine = ctx.engine().await?;

        if !self.fields.is_empty() {
            let document = parse_document(&input)?;
            let paths: Vec<&str> = self.fields.iter().map(String::as_str).collect();
            let decrypted = DocumentEncryptor::new(engine)
                .decrypt_fields(document, &paths)
                .await?;
            return print_output(&DocumentView(decrypted), ctx.format);
        }

        let bytes = STANDARD.decode(input.trim()).map_err(|e| {
            CliError::with_cause(ErrorKind::Validation, "Ciphertext is not valid base64", e)
        })?;
        let value = engine.decrypt(&bytes).await?;
        let key_id = engine.key_id_of(&bytes)?;

        print_output(&ValueView { key_id, value }, ctx.format)
    }
}

fn read_input(arg: &str) -> Result<String, CliError> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    Ok(input.trim_end_matches(['\n', '\r']).to_string())
}

fn parse_document(input: &str) -> Result<serde_json::Value, CliError> {
    serde_json::from_str(input)
        .map_err(|e| CliError::with_cause(ErrorKind::Validation, "Input is not a JSON document", e))
}
