//! Raw database settings as read from the config file and environment.
//!
//! These values are unvalidated. The profile resolver in
//! [`crate::infrastructure::database::profile`] turns them into an immutable
//! connection descriptor.

use std::fmt;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Database section of the configuration file.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseSettings {
    /// Backend selector (`sqlite`/`embedded` or `mysql`/`networked`).
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Database file for the embedded backend.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    /// Never read from the config file in production; prefer `DB_PASS`.
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database_name")]
    pub name: String,
    /// Connections kept open by the networked pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Extra connections the networked pool may open under load.
    #[serde(default = "default_max_overflow")]
    pub max_overflow: u32,
    /// Seconds a checkout may wait before failing.
    #[serde(default = "default_pool_timeout_secs")]
    pub pool_timeout_secs: u64,
    /// Connection max-age in seconds.
    #[serde(default = "default_pool_recycle_secs")]
    pub pool_recycle_secs: u64,
    #[serde(default = "default_keep_alive_interval_secs")]
    pub keep_alive_interval_secs: u64,
    /// Log every statement.
    #[serde(default)]
    pub echo: bool,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "***" };
        f.debug_struct("DatabaseSettings")
            .field("backend", &self.backend)
            .field("sqlite_path", &self.sqlite_path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &password)
            .field("name", &self.name)
            .field("pool_size", &self.pool_size)
            .field("max_overflow", &self.max_overflow)
            .field("pool_timeout_secs", &self.pool_timeout_secs)
            .field("pool_recycle_secs", &self.pool_recycle_secs)
            .field("keep_alive_interval_secs", &self.keep_alive_interval_secs)
            .field("echo", &self.echo)
            .finish()
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_sqlite_path() -> String {
    "./data/poolkeeper.db".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    3306
}

fn default_database_name() -> String {
    "poolkeeper".to_string()
}

const fn default_pool_size() -> u32 {
    10
}

const fn default_max_overflow() -> u32 {
    20
}

const fn default_pool_timeout_secs() -> u64 {
    30
}

const fn default_pool_recycle_secs() -> u64 {
    3600 // 1 hour
}

const fn default_keep_alive_interval_secs() -> u64 {
    1800 // 30 minutes
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: default_sqlite_path(),
            host: default_host(),
            port: default_port(),
            user: String::new(),
            password: String::new(),
            name: default_database_name(),
            pool_size: default_pool_size(),
            max_overflow: default_max_overflow(),
            pool_timeout_secs: default_pool_timeout_secs(),
            pool_recycle_secs: default_pool_recycle_secs(),
            keep_alive_interval_secs: default_keep_alive_interval_secs(),
            echo: false,
        }
    }
}

impl DatabaseSettings {
    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a numeric variable does not parse.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// `MYSQL_*` names are read first so the `DB_*` names win when both are set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a numeric variable does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DB_TYPE") {
            self.backend = v;
        }
        if let Some(v) = get("SQLITE_DATABASE_PATH") {
            self.sqlite_path = v;
        }

        for (alias, primary) in [
            ("MYSQL_HOST", "DB_HOST"),
            ("MYSQL_USER", "DB_USER"),
            ("MYSQL_PASSWORD", "DB_PASS"),
            ("MYSQL_DATABASE", "DB_NAME"),
        ] {
            if let Some(v) = get(primary).or_else(|| get(alias)) {
                match primary {
                    "DB_HOST" => self.host = v,
                    "DB_USER" => self.user = v,
                    "DB_PASS" => self.password = v,
                    _ => self.name = v,
                }
            }
        }

        if let Some(v) = get("DB_PORT").or_else(|| get("MYSQL_PORT")) {
            self.port = parse_env("DB_PORT", &v)?;
        }
        if let Some(v) = get("DB_POOL_SIZE") {
            self.pool_size = parse_env("DB_POOL_SIZE", &v)?;
        }
        if let Some(v) = get("DB_MAX_OVERFLOW") {
            self.max_overflow = parse_env("DB_MAX_OVERFLOW", &v)?;
        }
        if let Some(v) = get("DB_POOL_TIMEOUT") {
            self.pool_timeout_secs = parse_env("DB_POOL_TIMEOUT", &v)?;
        }
        if let Some(v) = get("DB_POOL_RECYCLE") {
            self.pool_recycle_secs = parse_env("DB_POOL_RECYCLE", &v)?;
        }
        if let Some(v) = get("DB_KEEP_ALIVE_INTERVAL") {
            self.keep_alive_interval_secs = parse_env("DB_KEEP_ALIVE_INTERVAL", &v)?;
        }
        if let Some(v) = get("DB_ECHO") {
            self.echo = parse_bool("DB_ECHO", &v)?;
        }
        Ok(())
    }
}

fn parse_env<T>(field: &'static str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        ConfigError::InvalidValue {
            field,
            reason: e.to_string(),
        }
        .into()
    })
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field,
            reason: format!("expected a boolean, got '{other}'"),
        }
        .into()),
    }
}
