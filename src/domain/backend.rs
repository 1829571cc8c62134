//! Backend kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which deployment profile of the relational store is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Single-file store opened in-process (SQLite).
    #[serde(rename = "sqlite")]
    Embedded,
    /// Multi-client store reached over the network (MySQL).
    #[serde(rename = "mysql")]
    Networked,
}

impl BackendKind {
    /// Store name reported by health and status endpoints.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Embedded => "sqlite",
            Self::Networked => "mysql",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "embedded" => Ok(Self::Embedded),
            "mysql" | "networked" => Ok(Self::Networked),
            other => Err(ConfigError::UnsupportedBackend(other.to_string())),
        }
    }
}
