//! Application configuration loading.
//!
//! Provides the main [`Config`] struct that aggregates all settings.
//! Configuration is loaded from a TOML file with environment variable
//! overrides for deployment-specific values like `DB_PASS`.
//!
//! # Example
//!
//! ```no_run
//! use poolkeeper::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default("poolkeeper.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use super::database::DatabaseSettings;
use super::logging::LoggingConfig;
use super::server::ServerConfig;
use crate::error::{ConfigError, Result};

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Store selection, credentials and pool sizing.
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ops endpoint configuration.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Parse configuration from TOML content without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed.
    pub fn parse_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e).into())
    }

    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - An environment override does not parse
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let mut config = Self::parse_toml(&content)?;
        config.database.apply_env()?;
        Ok(config)
    }

    /// Like [`Config::load`], but falls back to defaults plus environment
    /// when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file is unreadable or malformed, or an
    /// environment override does not parse.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        let mut config = Self::default();
        config.database.apply_env()?;
        Ok(config)
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
