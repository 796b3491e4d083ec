//! Blue/green slot colors.

use crate::KeyVaultError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two parallel secret slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Color {
    /// Blue slot.
    Blue,
    /// Green slot.
    Green,
}

impl Color {
    /// Both colors.
    pub const ALL: [Self; 2] = [Self::Blue, Self::Green];

    /// Returns the other color.
    #[must_use]
    pub const fn flip(&self) -> Self {
        match self {
            Self::Blue => Self::Green,
            Self::Green => Self::Blue,
        }
    }

    /// Lowercase name, used for collection and directory names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Green => "green",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blue => f.write_str("BLUE"),
            Self::Green => f.write_str("GREEN"),
        }
    }
}

impl FromStr for Color {
    type Err = KeyVaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blue" => Ok(Self::Blue),
            "green" => Ok(Self::Green),
            other => Err(KeyVaultError::InvalidRequest(format!(
                "unknown color '{other}' (expected blue or green)"
            ))),
        }
    }
}
