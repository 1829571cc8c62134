use std::time::Duration;

use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("unsupported database type: {0}")]
    UnsupportedBackend(String),

    #[error("backend '{0}' is not compiled into this build")]
    BackendNotCompiled(&'static str),

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build {pool} pool: {reason}")]
    PoolBuild { pool: &'static str, reason: String },

    #[error("{pool} pool exhausted: no connection available within {timeout:?} ({detail})")]
    PoolExhausted {
        pool: &'static str,
        timeout: Duration,
        detail: String,
    },

    #[error("{pool} pool is closed")]
    PoolClosed { pool: &'static str },

    #[error("database error: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("async database error: {0}")]
    AsyncQuery(#[from] sqlx::Error),

    #[error("failed to create table '{table}': {reason}")]
    Bootstrap { table: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True when the caller may retry the operation later.
    ///
    /// Only checkout timeouts qualify: the pool was healthy but saturated.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PoolExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
