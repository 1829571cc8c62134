//! Physical connections for the blocking pool.
//!
//! [`StoreConnection`] wraps the Diesel connection of whichever backend the
//! descriptor selected, and [`StoreConnectionManager`] teaches r2d2 how to
//! open, validate and discard them.

use std::fmt;
use std::path::PathBuf;

use diesel::connection::{
    AnsiTransactionManager, Instrumentation, InstrumentationEvent, SimpleConnection,
    TransactionManager,
};
#[cfg(feature = "mysql")]
use diesel::mysql::MysqlConnection;
use diesel::r2d2::{Error as DriverError, R2D2Connection};
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::SqliteConnection;
use diesel::{Connection, QueryResult, QueryableByName, RunQueryDsl};
use tracing::info;

#[cfg(not(feature = "mysql"))]
use crate::error::ConfigError;
use crate::domain::backend::BackendKind;
use crate::error::Result;
use crate::infrastructure::database::instrument::CheckoutTracker;
use crate::infrastructure::database::profile::{BackendProfile, ConnectionDescriptor};

/// Run `$body` against whichever driver connection `$conn` holds.
macro_rules! with_conn {
    ($conn:expr, $c:ident => $body:expr) => {
        match $conn {
            StoreConnection::Sqlite($c) => $body,
            #[cfg(feature = "mysql")]
            StoreConnection::Mysql($c) => $body,
        }
    };
}

/// Where the blocking driver connects.
#[derive(Clone)]
pub enum ConnectTarget {
    Sqlite {
        path: PathBuf,
    },
    #[cfg(feature = "mysql")]
    Mysql {
        url: String,
        redacted: String,
    },
}

impl ConnectTarget {
    /// Derive the connect target for a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BackendNotCompiled`] for a networked descriptor
    /// when the `mysql` feature is disabled.
    pub fn for_descriptor(descriptor: &ConnectionDescriptor) -> Result<Self> {
        match descriptor.profile() {
            BackendProfile::Embedded { path } => Ok(Self::Sqlite { path: path.clone() }),
            #[cfg(feature = "mysql")]
            BackendProfile::Networked(target) => Ok(Self::Mysql {
                url: target.url()?,
                redacted: target.redacted_url(),
            }),
            #[cfg(not(feature = "mysql"))]
            BackendProfile::Networked(_) => Err(ConfigError::BackendNotCompiled("mysql").into()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Sqlite { .. } => BackendKind::Embedded,
            #[cfg(feature = "mysql")]
            Self::Mysql { .. } => BackendKind::Networked,
        }
    }

    /// URL understood by the non-blocking driver.
    #[must_use]
    pub fn async_url(&self) -> String {
        match self {
            Self::Sqlite { path } => format!("sqlite://{}?mode=rwc", path.display()),
            #[cfg(feature = "mysql")]
            Self::Mysql { url, .. } => url.clone(),
        }
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite { path } => f.debug_struct("Sqlite").field("path", path).finish(),
            #[cfg(feature = "mysql")]
            Self::Mysql { redacted, .. } => f.debug_struct("Mysql").field("url", redacted).finish(),
        }
    }
}

/// A physical connection owned by the blocking pool.
pub enum StoreConnection {
    Sqlite(SqliteConnection),
    #[cfg(feature = "mysql")]
    Mysql(MysqlConnection),
}

/// Catalog query counting tables named by its single bind parameter.
pub(crate) fn table_exists_sql(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Embedded => {
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?"
        }
        BackendKind::Networked => {
            "SELECT COUNT(*) AS count FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ?"
        }
    }
}

#[derive(QueryableByName)]
struct TableCount {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

impl StoreConnection {
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Sqlite(_) => BackendKind::Embedded,
            #[cfg(feature = "mysql")]
            Self::Mysql(_) => BackendKind::Networked,
        }
    }

    /// Execute one or more statements without results.
    pub fn batch_execute(&mut self, sql: &str) -> QueryResult<()> {
        with_conn!(self, c => c.batch_execute(sql))
    }

    /// Execute a single statement and return the affected row count.
    pub fn execute(&mut self, sql: &str) -> QueryResult<usize> {
        with_conn!(self, c => diesel::sql_query(sql).execute(c))
    }

    /// Trivial liveness query.
    pub fn ping(&mut self) -> QueryResult<()> {
        with_conn!(self, c => R2D2Connection::ping(c))
    }

    /// True if the connection is unusable or left inside a transaction.
    pub fn is_broken(&mut self) -> bool {
        with_conn!(self, c => R2D2Connection::is_broken(c))
    }

    pub fn begin(&mut self) -> QueryResult<()> {
        with_conn!(self, c => AnsiTransactionManager::begin_transaction(c))
    }

    pub fn commit(&mut self) -> QueryResult<()> {
        with_conn!(self, c => AnsiTransactionManager::commit_transaction(c))
    }

    pub fn rollback(&mut self) -> QueryResult<()> {
        with_conn!(self, c => AnsiTransactionManager::rollback_transaction(c))
    }

    /// Ask the store catalog whether `table` exists.
    pub fn table_exists(&mut self, table: &str) -> QueryResult<bool> {
        let sql = table_exists_sql(self.kind());
        let row: TableCount = with_conn!(self, c => diesel::sql_query(sql)
            .bind::<Text, _>(table)
            .get_result(c)?);
        Ok(row.count > 0)
    }

    /// Log every statement on the `poolkeeper::sql` target.
    pub fn enable_echo(&mut self) {
        with_conn!(self, c => c.set_instrumentation(SqlEcho))
    }
}

impl fmt::Debug for StoreConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StoreConnection").field(&self.kind()).finish()
    }
}

struct SqlEcho;

impl Instrumentation for SqlEcho {
    fn on_connection_event(&mut self, event: InstrumentationEvent<'_>) {
        if let InstrumentationEvent::StartQuery { query, .. } = event {
            info!(target: "poolkeeper::sql", "{query}");
        }
    }
}

/// r2d2 connection manager for [`StoreConnection`].
///
/// Validation on checkout runs [`StoreConnection::ping`]; connections left in
/// a broken transaction state are discarded instead of returned. Both kinds of
/// discard are reported to the attached tracker, if any.
#[derive(Debug, Clone)]
pub struct StoreConnectionManager {
    target: ConnectTarget,
    tracker: Option<CheckoutTracker>,
}

impl StoreConnectionManager {
    #[must_use]
    pub fn new(target: ConnectTarget) -> Self {
        Self {
            target,
            tracker: None,
        }
    }

    #[must_use]
    pub fn with_tracker(mut self, tracker: CheckoutTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    #[must_use]
    pub fn target(&self) -> &ConnectTarget {
        &self.target
    }
}

impl r2d2::ManageConnection for StoreConnectionManager {
    type Connection = StoreConnection;
    type Error = DriverError;

    fn connect(&self) -> std::result::Result<StoreConnection, DriverError> {
        match &self.target {
            ConnectTarget::Sqlite { path } => {
                SqliteConnection::establish(&path.to_string_lossy())
                    .map(StoreConnection::Sqlite)
                    .map_err(DriverError::ConnectionError)
            }
            #[cfg(feature = "mysql")]
            ConnectTarget::Mysql { url, .. } => MysqlConnection::establish(url)
                .map(StoreConnection::Mysql)
                .map_err(DriverError::ConnectionError),
        }
    }

    fn is_valid(&self, conn: &mut StoreConnection) -> std::result::Result<(), DriverError> {
        conn.ping().map_err(|e| {
            if let Some(tracker) = &self.tracker {
                tracker.record_invalidated("failed validation");
            }
            DriverError::QueryError(e)
        })
    }

    fn has_broken(&self, conn: &mut StoreConnection) -> bool {
        let broken = conn.is_broken();
        if broken {
            if let Some(tracker) = &self.tracker {
                tracker.record_invalidated("broken");
            }
        }
        broken
    }
}
