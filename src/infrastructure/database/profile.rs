//! Backend profile resolution.
//!
//! Turns raw [`DatabaseSettings`] into a [`ConnectionDescriptor`]: the single,
//! immutable description of how this process reaches its store. Every other
//! component branches on [`BackendProfile`] exactly once, at construction.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::domain::backend::BackendKind;
use crate::error::{ConfigError, Result};
use crate::infrastructure::config::database::DatabaseSettings;

/// Busy timeout applied to every embedded connection.
pub const EMBEDDED_BUSY_TIMEOUT: Duration = Duration::from_secs(20);
/// Networked driver connect timeout.
pub const NETWORKED_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
/// Networked driver read timeout.
pub const NETWORKED_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Networked driver write timeout.
pub const NETWORKED_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// Seconds a networked session waits on a row lock.
pub const LOCK_WAIT_TIMEOUT_SECS: u64 = 50;
/// Upper bound for configured timeouts and intervals.
pub const MAX_SETTING_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Upper bound for base plus overflow connections.
pub const MAX_POOL_CONNECTIONS: u32 = 10_000;

/// Address and credentials of a networked store.
#[derive(Clone, PartialEq, Eq)]
pub struct NetworkTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl NetworkTarget {
    /// Connection URL with percent-encoded credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the host cannot form a URL.
    pub fn url(&self) -> Result<String> {
        self.build_url(Some(&self.password))
    }

    /// Connection URL safe for logs, with the password replaced by `***`.
    #[must_use]
    pub fn redacted_url(&self) -> String {
        self.build_url(Some("***")).unwrap_or_else(|_| {
            format!(
                "mysql://{}:***@{}:{}/{}",
                self.user, self.host, self.port, self.database
            )
        })
    }

    fn build_url(&self, password: Option<&str>) -> Result<String> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: "DB_HOST",
            reason: reason.to_string(),
        };

        let mut url = Url::parse(&format!("mysql://{}", self.host))
            .map_err(|e| invalid(&e.to_string()))?;
        url.set_port(Some(self.port))
            .map_err(|()| invalid("host does not accept a port"))?;
        url.set_username(&self.user)
            .map_err(|()| invalid("host does not accept credentials"))?;
        url.set_password(password)
            .map_err(|()| invalid("host does not accept credentials"))?;
        url.set_path(&self.database);
        Ok(url.to_string())
    }
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for NetworkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// Tagged backend profile carried by the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendProfile {
    Embedded { path: PathBuf },
    Networked(NetworkTarget),
}

/// Base and overflow sizing of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizing {
    /// Connections the pool keeps open.
    pub base: u32,
    /// Additional connections allowed under load.
    pub overflow: u32,
}

impl PoolSizing {
    /// Hard cap on open connections.
    #[must_use]
    pub const fn max_size(&self) -> u32 {
        self.base.saturating_add(self.overflow)
    }
}

/// Driver-level timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTimeouts {
    pub connect: Duration,
    pub read: Option<Duration>,
    pub write: Option<Duration>,
    /// Lock wait for the embedded store.
    pub busy: Option<Duration>,
}

/// A `SET SESSION name=value` applied once per physical connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionVariable {
    pub name: String,
    pub value: String,
}

impl SessionVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// SQL statement applying this variable.
    #[must_use]
    pub fn statement(&self) -> String {
        format!("SET SESSION {}={}", self.name, self.value)
    }
}

/// Fully specified, immutable description of how to reach the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    profile: BackendProfile,
    sizing: PoolSizing,
    checkout_timeout: Duration,
    max_age: Option<Duration>,
    keep_alive_interval: Option<Duration>,
    session_variables: Vec<SessionVariable>,
    timeouts: DriverTimeouts,
    echo: bool,
}

impl ConnectionDescriptor {
    /// Resolve settings into a descriptor.
    ///
    /// For the embedded kind the parent directory of the database file is
    /// created if missing.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the backend kind is unsupported, a
    /// required field is missing, a numeric value is out of range, or the
    /// embedded directory cannot be created.
    pub fn resolve(settings: &DatabaseSettings) -> Result<Self> {
        let kind: BackendKind = settings.backend.parse()?;
        let checkout_timeout = bounded_secs(settings.pool_timeout_secs, "DB_POOL_TIMEOUT")?;

        match kind {
            BackendKind::Embedded => Self::embedded(settings, checkout_timeout),
            BackendKind::Networked => Self::networked(settings, checkout_timeout),
        }
    }

    fn embedded(settings: &DatabaseSettings, checkout_timeout: Duration) -> Result<Self> {
        let raw = settings.sqlite_path.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingField {
                field: "SQLITE_DATABASE_PATH",
            }
            .into());
        }
        let path = PathBuf::from(raw);
        ensure_parent_dir(&path)?;

        Ok(Self {
            profile: BackendProfile::Embedded { path },
            // The embedded store does not tolerate concurrent writers.
            sizing: PoolSizing {
                base: 1,
                overflow: 0,
            },
            checkout_timeout,
            max_age: None,
            keep_alive_interval: None,
            session_variables: Vec::new(),
            timeouts: DriverTimeouts {
                connect: checkout_timeout,
                read: None,
                write: None,
                busy: Some(EMBEDDED_BUSY_TIMEOUT),
            },
            echo: settings.echo,
        })
    }

    fn networked(settings: &DatabaseSettings, checkout_timeout: Duration) -> Result<Self> {
        let required = |value: &str, field: &'static str| -> Result<String> {
            let value = value.trim();
            if value.is_empty() {
                return Err(ConfigError::MissingField { field }.into());
            }
            Ok(value.to_string())
        };

        // Passwords are taken verbatim; surrounding spaces are significant.
        if settings.password.is_empty() {
            return Err(ConfigError::MissingField { field: "DB_PASS" }.into());
        }
        let target = NetworkTarget {
            host: required(&settings.host, "DB_HOST")?,
            port: settings.port,
            user: required(&settings.user, "DB_USER")?,
            password: settings.password.clone(),
            database: required(&settings.name, "DB_NAME")?,
        };
        target.url()?;

        if settings.pool_size == 0 {
            return Err(invalid("DB_POOL_SIZE", "must be greater than 0"));
        }
        match settings.pool_size.checked_add(settings.max_overflow) {
            Some(total) if total <= MAX_POOL_CONNECTIONS => {}
            _ => {
                return Err(invalid(
                    "DB_MAX_OVERFLOW",
                    &format!("pool size plus overflow must not exceed {MAX_POOL_CONNECTIONS}"),
                ))
            }
        }
        let max_age = bounded_secs(settings.pool_recycle_secs, "DB_POOL_RECYCLE")?;
        let keep_alive_interval =
            bounded_secs(settings.keep_alive_interval_secs, "DB_KEEP_ALIVE_INTERVAL")?;

        let timeouts = DriverTimeouts {
            connect: NETWORKED_CONNECT_TIMEOUT,
            read: Some(NETWORKED_READ_TIMEOUT),
            write: Some(NETWORKED_WRITE_TIMEOUT),
            busy: None,
        };

        let mut session_variables = vec![
            SessionVariable::new("sql_mode", "'STRICT_TRANS_TABLES'"),
            SessionVariable::new("autocommit", "0"),
            SessionVariable::new("innodb_lock_wait_timeout", LOCK_WAIT_TIMEOUT_SECS.to_string()),
        ];
        if let Some(read) = timeouts.read {
            session_variables.push(SessionVariable::new(
                "net_read_timeout",
                read.as_secs().to_string(),
            ));
        }
        if let Some(write) = timeouts.write {
            session_variables.push(SessionVariable::new(
                "net_write_timeout",
                write.as_secs().to_string(),
            ));
        }

        Ok(Self {
            profile: BackendProfile::Networked(target),
            sizing: PoolSizing {
                base: settings.pool_size,
                overflow: settings.max_overflow,
            },
            checkout_timeout,
            max_age: Some(max_age),
            keep_alive_interval: Some(keep_alive_interval),
            session_variables,
            timeouts,
            echo: settings.echo,
        })
    }

    /// Copy of this descriptor with a different checkout timeout.
    #[must_use]
    pub fn with_checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout.min(MAX_SETTING_DURATION);
        self
    }

    /// Copy of this descriptor with a different keep-alive period.
    ///
    /// Ignored for the embedded kind, which never schedules keep-alive.
    #[must_use]
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        if matches!(self.profile, BackendProfile::Networked(_)) {
            self.keep_alive_interval = Some(interval.min(MAX_SETTING_DURATION));
        }
        self
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self.profile {
            BackendProfile::Embedded { .. } => BackendKind::Embedded,
            BackendProfile::Networked(_) => BackendKind::Networked,
        }
    }

    #[must_use]
    pub fn profile(&self) -> &BackendProfile {
        &self.profile
    }

    #[must_use]
    pub fn sizing(&self) -> PoolSizing {
        self.sizing
    }

    #[must_use]
    pub fn checkout_timeout(&self) -> Duration {
        self.checkout_timeout
    }

    /// Age after which a connection is recycled; `None` keeps connections forever.
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Keep-alive period; `None` means nothing needs keeping alive.
    #[must_use]
    pub fn keep_alive_interval(&self) -> Option<Duration> {
        self.keep_alive_interval
    }

    #[must_use]
    pub fn session_variables(&self) -> &[SessionVariable] {
        &self.session_variables
    }

    #[must_use]
    pub fn timeouts(&self) -> DriverTimeouts {
        self.timeouts
    }

    #[must_use]
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Human-readable store address with secrets masked.
    #[must_use]
    pub fn display_address(&self) -> String {
        match &self.profile {
            BackendProfile::Embedded { path } => format!("sqlite://{}", path.display()),
            BackendProfile::Networked(target) => target.redacted_url(),
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> crate::error::Error {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
    .into()
}

/// Seconds from configuration, non-zero and at most [`MAX_SETTING_DURATION`].
fn bounded_secs(secs: u64, field: &'static str) -> Result<Duration> {
    if secs == 0 {
        return Err(invalid(field, "must be greater than 0"));
    }
    let value = Duration::from_secs(secs);
    if value > MAX_SETTING_DURATION {
        return Err(invalid(
            field,
            &format!("must not exceed {} seconds", MAX_SETTING_DURATION.as_secs()),
        ));
    }
    Ok(value)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|e| {
        ConfigError::InvalidValue {
            field: "SQLITE_DATABASE_PATH",
            reason: format!("cannot create {}: {e}", parent.display()),
        }
        .into()
    })
}
