//! Typed scalar values accepted by explicit encryption.

use crate::{KeyVaultError, KeyVaultResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scalar value type, identified on the wire by a one-byte tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// UTF-8 string.
    String,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// IEEE-754 double.
    Double,
    /// Boolean.
    Boolean,
    /// Raw bytes.
    Binary,
    /// UTC timestamp, millisecond precision.
    DateTime,
}

impl ValueType {
    /// Wire tag.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Double => 0x01,
            Self::String => 0x02,
            Self::Binary => 0x05,
            Self::Boolean => 0x08,
            Self::DateTime => 0x09,
            Self::Int32 => 0x10,
            Self::Int64 => 0x12,
        }
    }

    /// Looks up a type by wire tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::Double),
            0x02 => Some(Self::String),
            0x05 => Some(Self::Binary),
            0x08 => Some(Self::Boolean),
            0x09 => Some(Self::DateTime),
            0x10 => Some(Self::Int32),
            0x12 => Some(Self::Int64),
            _ => None,
        }
    }

    /// Returns true if deterministic encryption may be used for this type.
    ///
    /// Doubles and booleans are excluded: float equality is unreliable and a
    /// two-valued domain is fully revealed by equality patterns.
    #[must_use]
    pub const fn supports_deterministic(&self) -> bool {
        !matches!(self, Self::Double | Self::Boolean)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Binary => "binary",
            Self::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

impl FromStr for ValueType {
    type Err = KeyVaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" | "str" => Ok(Self::String),
            "int32" | "int" => Ok(Self::Int32),
            "int64" | "long" => Ok(Self::Int64),
            "double" | "float" => Ok(Self::Double),
            "boolean" | "bool" => Ok(Self::Boolean),
            "binary" | "bytes" => Ok(Self::Binary),
            "datetime" | "date" => Ok(Self::DateTime),
            other => Err(KeyVaultError::InvalidRequest(format!(
                "unknown value type '{other}'"
            ))),
        }
    }
}

/// A typed scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    /// UTF-8 string.
    String(String),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// IEEE-754 double.
    Double(f64),
    /// Boolean.
    Boolean(bool),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// UTC timestamp.
    #[serde(rename = "datetime")]
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    /// Returns the value type.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::Int32(_) => ValueType::Int32,
            Self::Int64(_) => ValueType::Int64,
            Self::Double(_) => ValueType::Double,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Binary(_) => ValueType::Binary,
            Self::DateTime(_) => ValueType::DateTime,
        }
    }

    /// Encodes the value payload (without type tag).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::String(s) => s.as_bytes().to_vec(),
            Self::Int32(v) => v.to_le_bytes().to_vec(),
            Self::Int64(v) => v.to_le_bytes().to_vec(),
            Self::Double(v) => v.to_le_bytes().to_vec(),
            Self::Boolean(v) => vec![u8::from(*v)],
            Self::Binary(b) => b.clone(),
            Self::DateTime(dt) => dt.timestamp_millis().to_le_bytes().to_vec(),
        }
    }

    /// Decodes a value payload of the given type.
    pub fn from_bytes(value_type: ValueType, bytes: &[u8]) -> KeyVaultResult<Self> {
        let invalid = || {
            KeyVaultError::InvalidCiphertext(format!(
                "malformed {value_type} payload ({} bytes)",
                bytes.len()
            ))
        };

        match value_type {
            ValueType::String => String::from_utf8(bytes.to_vec())
                .map(Self::String)
                .map_err(|_| invalid()),
            ValueType::Int32 => bytes
                .try_into()
                .map(|b| Self::Int32(i32::from_le_bytes(b)))
                .map_err(|_| invalid()),
            ValueType::Int64 => bytes
                .try_into()
                .map(|b| Self::Int64(i64::from_le_bytes(b)))
                .map_err(|_| invalid()),
            ValueType::Double => bytes
                .try_into()
                .map(|b| Self::Double(f64::from_le_bytes(b)))
                .map_err(|_| invalid()),
            ValueType::Boolean => match bytes {
                [0] => Ok(Self::Boolean(false)),
                [1] => Ok(Self::Boolean(true)),
                _ => Err(invalid()),
            },
            ValueType::Binary => Ok(Self::Binary(bytes.to_vec())),
            ValueType::DateTime => {
                let millis = bytes
                    .try_into()
                    .map(i64::from_le_bytes)
                    .map_err(|_| invalid())?;
                Utc.timestamp_millis_opt(millis)
                    .single()
                    .map(Self::DateTime)
                    .ok_or_else(invalid)
            }
        }
    }

    /// Parses a textual value of the given type.
    pub fn parse(value_type: ValueType, text: &str) -> KeyVaultResult<Self> {
        fn invalid(value_type: ValueType, text: &str, e: impl fmt::Display) -> KeyVaultError {
            KeyVaultError::InvalidRequest(format!("cannot parse '{text}' as {value_type}: {e}"))
        }

        match value_type {
            ValueType::String => Ok(Self::String(text.to_string())),
            ValueType::Int32 => text
                .parse()
                .map(Self::Int32)
                .map_err(|e| invalid(value_type, text, e)),
            ValueType::Int64 => text
                .parse()
                .map(Self::Int64)
                .map_err(|e| invalid(value_type, text, e)),
            ValueType::Double => text
                .parse()
                .map(Self::Double)
                .map_err(|e| invalid(value_type, text, e)),
            ValueType::Boolean => text
                .parse()
                .map(Self::Boolean)
                .map_err(|e| invalid(value_type, text, e)),
            ValueType::Binary => {
                use base64::{engine::general_purpose::STANDARD, Engine};
                STANDARD
                    .decode(text)
                    .map(Self::Binary)
                    .map_err(|e| invalid(value_type, text, e))
            }
            ValueType::DateTime => DateTime::parse_from_rfc3339(text)
                .map(|dt| Self::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| invalid(value_type, text, e)),
        }
    }

    /// Returns the string if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Binary(b) => {
                use base64::{engine::general_purpose::STANDARD, Engine};
                f.write_str(&STANDARD.encode(b))
            }
            Self::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}
