//! Field-level encryption of JSON documents.

use crate::engine::{EncryptionEngine, EncryptionRequest};
use base64::{engine::general_purpose::STANDARD, Engine};
use keyvault_core::{EncryptionAlgorithm, FieldValue, KeyRef, KeyVaultError, KeyVaultResult};
use serde_json::{Map, Number, Value};
use std::sync::Arc;

/// Key of the object that replaces an encrypted field.
pub const ENCRYPTED_MARKER: &str = "$encrypted";

/// Encrypts selected fields of JSON documents.
///
/// Each encrypted field is replaced with `{"$encrypted": "<base64>"}`.
/// Paths are dotted (`patient.ssn`); missing paths and `null` values are
/// left untouched. Only scalar fields can be encrypted.
#[derive(Debug)]
pub struct DocumentEncryptor {
    engine: Arc<EncryptionEngine>,
}

impl DocumentEncryptor {
    /// Creates a document encryptor.
    #[must_use]
    pub fn new(engine: Arc<EncryptionEngine>) -> Self {
        Self { engine }
    }

    /// Encrypts the fields at `paths` under `key`.
    pub async fn encrypt_fields(
        &self,
        mut data: Value,
        paths: &[&str],
        key: &KeyRef,
        algorithm: EncryptionAlgorithm,
    ) -> KeyVaultResult<Value> {
        for path in paths {
            let Some(field) = get_field_mut(&mut data, path) else {
                continue;
            };
            if field.is_null() || is_encrypted(field) {
                continue;
            }

            let value = to_field_value(path, field)?;
            let request = EncryptionRequest::new(key.clone(), algorithm, value);
            let ciphertext = self.engine.encrypt_field(path, &request).await?;

            let mut marker = Map::new();
            marker.insert(
                ENCRYPTED_MARKER.to_string(),
                Value::String(STANDARD.encode(ciphertext)),
            );
            *field = Value::Object(marker);
        }
        Ok(data)
    }

    /// Decrypts the encrypted fields found at `paths`.
    pub async fn decrypt_fields(&self, mut data: Value, paths: &[&str]) -> KeyVaultResult<Value> {
        for path in paths {
            let Some(field) = get_field_mut(&mut data, path) else {
                continue;
            };
            let Some(encoded) = field.get(ENCRYPTED_MARKER).and_then(Value::as_str) else {
                continue;
            };

            let ciphertext = STANDARD.decode(encoded).map_err(|e| {
                KeyVaultError::InvalidCiphertext(format!("field '{path}' is not base64: {e}"))
            })?;
            let value = self.engine.decrypt(&ciphertext).await?;
            *field = to_json(value);
        }
        Ok(data)
    }
}

fn is_encrypted(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| m.len() == 1 && m.contains_key(ENCRYPTED_MARKER))
}

fn get_field_mut<'a>(data: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(data, |current, part| current.get_mut(part))
}

fn to_field_value(path: &str, value: &Value) -> KeyVaultResult<FieldValue> {
    match value {
        Value::String(s) => Ok(FieldValue::String(s.clone())),
        Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Ok(FieldValue::Int64(i)),
            (None, None, Some(f)) => Ok(FieldValue::Double(f)),
            _ => Err(KeyVaultError::InvalidRequest(format!(
                "field '{path}' holds a number outside the supported range"
            ))),
        },
        Value::Null | Value::Array(_) | Value::Object(_) => Err(KeyVaultError::InvalidRequest(
            format!("field '{path}' is not a scalar value"),
        )),
    }
}

fn to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::String(s) => Value::String(s),
        FieldValue::Int32(i) => Value::Number(i.into()),
        FieldValue::Int64(i) => Value::Number(i.into()),
        FieldValue::Double(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        FieldValue::Boolean(b) => Value::Bool(b),
        FieldValue::Binary(bytes) => Value::String(STANDARD.encode(bytes)),
        FieldValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
    }
}
