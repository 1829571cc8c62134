//! Pool factory.
//!
//! Builds the blocking (r2d2 over Diesel) and non-blocking (sqlx) pools from a
//! [`ConnectionDescriptor`]. The two pools are sized from the same descriptor
//! but never share a physical connection.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool, ConnectOptions, Transaction};
use tracing::{info, warn};

use crate::domain::health::PoolOccupancy;
use crate::error::{ConfigError, Error, Result};
use crate::infrastructure::database::connection::{ConnectTarget, StoreConnectionManager};
use crate::infrastructure::database::instrument::{CheckoutTracker, LogErrorHandler, SessionSetup};
use crate::infrastructure::database::profile::{
    BackendProfile, ConnectionDescriptor, PoolSizing, MAX_SETTING_DURATION,
};

/// Name used for the blocking pool in logs and errors.
pub const BLOCKING_POOL: &str = "blocking";
/// Name used for the non-blocking pool in logs and errors.
pub const ASYNC_POOL: &str = "async";

const ASYNC_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A connection checked out of the blocking pool.
pub type PooledStoreConnection = r2d2::PooledConnection<StoreConnectionManager>;

/// How a pool hands out connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStrategy {
    /// One connection shared by all callers in turn.
    SharedSingle,
    /// Keeps `base` connections open, grows by up to `overflow` under load,
    /// validates before each checkout and recycles connections by age.
    Elastic {
        sizing: PoolSizing,
        max_age: Option<Duration>,
    },
}

impl PoolStrategy {
    #[must_use]
    pub fn for_descriptor(descriptor: &ConnectionDescriptor) -> Self {
        match descriptor.profile() {
            BackendProfile::Embedded { .. } => Self::SharedSingle,
            BackendProfile::Networked(_) => Self::Elastic {
                sizing: descriptor.sizing(),
                max_age: descriptor.max_age(),
            },
        }
    }

    #[must_use]
    pub fn sizing(&self) -> PoolSizing {
        match self {
            Self::SharedSingle => PoolSizing {
                base: 1,
                overflow: 0,
            },
            Self::Elastic { sizing, .. } => *sizing,
        }
    }

    fn max_age(&self) -> Option<Duration> {
        match self {
            Self::SharedSingle => None,
            Self::Elastic { max_age, .. } => *max_age,
        }
    }
}

/// Blocking connection pool with checkout instrumentation.
#[derive(Debug, Clone)]
pub struct BlockingPool {
    pool: r2d2::Pool<StoreConnectionManager>,
    tracker: CheckoutTracker,
    strategy: PoolStrategy,
    checkout_timeout: Duration,
}

impl BlockingPool {
    /// Build the blocking pool for a descriptor.
    ///
    /// Blocks until the base connections are open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the backend is not compiled in and
    /// [`Error::PoolBuild`] when the store cannot be reached.
    pub fn build(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let target = ConnectTarget::for_descriptor(descriptor)?;
        Self::build_with(
            target,
            PoolStrategy::for_descriptor(descriptor),
            descriptor.checkout_timeout(),
            SessionSetup::for_descriptor(descriptor),
        )
    }

    /// Build a pool from explicit parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `checkout_timeout` is zero or longer
    /// than [`MAX_SETTING_DURATION`], and [`Error::PoolBuild`] when the base
    /// connections cannot be opened within `checkout_timeout`.
    pub fn build_with(
        target: ConnectTarget,
        strategy: PoolStrategy,
        checkout_timeout: Duration,
        setup: SessionSetup,
    ) -> Result<Self> {
        Self::build_tracked(
            target,
            strategy,
            checkout_timeout,
            setup,
            CheckoutTracker::new(BLOCKING_POOL),
        )
    }

    /// Like [`BlockingPool::build_with`] with a caller-supplied tracker.
    ///
    /// # Errors
    ///
    /// Same as [`BlockingPool::build_with`].
    pub fn build_tracked(
        target: ConnectTarget,
        strategy: PoolStrategy,
        checkout_timeout: Duration,
        setup: SessionSetup,
        tracker: CheckoutTracker,
    ) -> Result<Self> {
        if checkout_timeout.is_zero() || checkout_timeout > MAX_SETTING_DURATION {
            return Err(ConfigError::InvalidValue {
                field: "checkout_timeout",
                reason: format!("must be non-zero and at most {MAX_SETTING_DURATION:?}"),
            }
            .into());
        }
        let sizing = strategy.sizing();
        let tracker = tracker.with_max_age(strategy.max_age());
        let builder = r2d2::Pool::<StoreConnectionManager>::builder()
            .max_size(sizing.max_size())
            .min_idle(Some(sizing.base))
            .test_on_check_out(true)
            .connection_timeout(checkout_timeout)
            .max_lifetime(strategy.max_age())
            .connection_customizer(Box::new(setup))
            .event_handler(Box::new(tracker.clone()))
            .error_handler(Box::new(LogErrorHandler {
                pool: BLOCKING_POOL,
            }));
        // The shared connection is never reaped for idleness.
        let builder = match strategy {
            PoolStrategy::SharedSingle => builder.idle_timeout(None),
            PoolStrategy::Elastic { .. } => builder,
        };

        let manager = StoreConnectionManager::new(target).with_tracker(tracker.clone());
        let pool = builder.build(manager).map_err(|e| Error::PoolBuild {
            pool: BLOCKING_POOL,
            reason: e.to_string(),
        })?;

        info!(
            pool = BLOCKING_POOL,
            base = sizing.base,
            overflow = sizing.overflow,
            timeout_ms = checkout_timeout.as_millis() as u64,
            "Connection pool ready"
        );

        Ok(Self {
            pool,
            tracker,
            strategy,
            checkout_timeout,
        })
    }

    /// Check out a connection, waiting up to the checkout timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if no connection becomes available.
    pub fn checkout(&self) -> Result<PooledStoreConnection> {
        self.pool
            .get_timeout(self.checkout_timeout)
            .map_err(|e| Error::PoolExhausted {
                pool: BLOCKING_POOL,
                timeout: self.checkout_timeout,
                detail: e.to_string(),
            })
    }

    /// Current occupancy counters.
    #[must_use]
    pub fn occupancy(&self) -> PoolOccupancy {
        let state = self.pool.state();
        let sizing = self.strategy.sizing();
        PoolOccupancy {
            pool_size: sizing.base,
            max_overflow: sizing.overflow,
            checked_in: state.idle_connections,
            checked_out: state.connections.saturating_sub(state.idle_connections),
            overflow: state.connections.saturating_sub(sizing.base),
            invalidated: self.tracker.invalidated(),
        }
    }

    #[must_use]
    pub fn strategy(&self) -> PoolStrategy {
        self.strategy
    }

    #[must_use]
    pub fn checkout_timeout(&self) -> Duration {
        self.checkout_timeout
    }

    #[must_use]
    pub fn tracker(&self) -> &CheckoutTracker {
        &self.tracker
    }
}

/// Non-blocking connection pool.
#[derive(Debug, Clone)]
pub struct AsyncPool {
    pool: AnyPool,
    checkout_timeout: Duration,
}

impl AsyncPool {
    /// Open the non-blocking pool for a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the backend is not compiled in and
    /// [`Error::PoolBuild`] when the first connection cannot be opened within
    /// the connect timeout.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let target = ConnectTarget::for_descriptor(descriptor)?;
        let strategy = PoolStrategy::for_descriptor(descriptor);
        let sizing = strategy.sizing();
        let checkout_timeout = descriptor.checkout_timeout();
        let connect_timeout = descriptor.timeouts().connect;
        let statements = Arc::new(SessionSetup::for_descriptor(descriptor).statements().to_vec());

        let mut connect_options =
            AnyConnectOptions::from_str(&target.async_url()).map_err(|e| Error::PoolBuild {
                pool: ASYNC_POOL,
                reason: e.to_string(),
            })?;
        if !descriptor.echo() {
            connect_options = connect_options.disable_statement_logging();
        }

        let options = AnyPoolOptions::new()
            .max_connections(sizing.max_size())
            .min_connections(sizing.base)
            .acquire_timeout(checkout_timeout)
            .max_lifetime(strategy.max_age())
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                let statements = Arc::clone(&statements);
                Box::pin(async move {
                    for statement in statements.iter() {
                        if let Err(e) = sqlx::query(statement).execute(&mut *conn).await {
                            warn!(statement = %statement, error = %e, "Failed to apply session setting");
                        }
                    }
                    Ok(())
                })
            });

        let pool = tokio::time::timeout(connect_timeout, options.connect_with(connect_options))
            .await
            .map_err(|_| Error::PoolBuild {
                pool: ASYNC_POOL,
                reason: format!("timed out after {connect_timeout:?}"),
            })?
            .map_err(|e| Error::PoolBuild {
                pool: ASYNC_POOL,
                reason: e.to_string(),
            })?;

        info!(
            pool = ASYNC_POOL,
            base = sizing.base,
            overflow = sizing.overflow,
            "Connection pool ready"
        );

        Ok(Self {
            pool,
            checkout_timeout,
        })
    }

    /// Acquire a connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] on timeout and [`Error::PoolClosed`]
    /// after [`AsyncPool::close`].
    pub async fn acquire(&self) -> Result<PoolConnection<Any>> {
        self.pool.acquire().await.map_err(|e| self.acquire_error(e))
    }

    /// Acquire a connection and open a transaction on it.
    ///
    /// # Errors
    ///
    /// Same as [`AsyncPool::acquire`], plus [`Error::AsyncQuery`] if `BEGIN`
    /// fails.
    pub async fn begin(&self) -> Result<Transaction<'static, Any>> {
        self.pool.begin().await.map_err(|e| self.acquire_error(e))
    }

    /// Close the pool, waiting briefly for checked-out connections.
    pub async fn close(&self) {
        if tokio::time::timeout(ASYNC_CLOSE_TIMEOUT, self.pool.close())
            .await
            .is_err()
        {
            warn!(pool = ASYNC_POOL, "Timed out waiting for connections to close");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Open connections and idle connections.
    #[must_use]
    pub fn size(&self) -> (u32, usize) {
        (self.pool.size(), self.pool.num_idle())
    }

    fn acquire_error(&self, e: sqlx::Error) -> Error {
        match e {
            sqlx::Error::PoolTimedOut => Error::PoolExhausted {
                pool: ASYNC_POOL,
                timeout: self.checkout_timeout,
                detail: e.to_string(),
            },
            sqlx::Error::PoolClosed => Error::PoolClosed { pool: ASYNC_POOL },
            other => Error::AsyncQuery(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::infrastructure::config::database::DatabaseSettings;
    use crate::infrastructure::database::profile::EMBEDDED_BUSY_TIMEOUT;

    fn embedded_descriptor(dir: &Path) -> ConnectionDescriptor {
        let settings = DatabaseSettings {
            sqlite_path: dir.join("pool.db").display().to_string(),
            ..DatabaseSettings::default()
        };
        ConnectionDescriptor::resolve(&settings).unwrap()
    }

    fn elastic(dir: &Path, base: u32, overflow: u32, timeout: Duration) -> BlockingPool {
        BlockingPool::build_with(
            ConnectTarget::Sqlite {
                path: dir.join("elastic.db"),
            },
            PoolStrategy::Elastic {
                sizing: PoolSizing { base, overflow },
                max_age: Some(Duration::from_secs(3600)),
            },
            timeout,
            SessionSetup::default(),
        )
        .unwrap()
    }

    #[test]
    fn embedded_uses_shared_single_connection() {
        let dir = tempfile::tempdir().unwrap();
        let pool = BlockingPool::build(&embedded_descriptor(dir.path())).unwrap();

        assert_eq!(pool.strategy(), PoolStrategy::SharedSingle);
        let occupancy = pool.occupancy();
        assert_eq!(occupancy.pool_size, 1);
        assert_eq!(occupancy.max_overflow, 0);
        assert_eq!(occupancy.checked_out, 0);
    }

    #[test]
    fn elastic_reports_configured_sizing() {
        let dir = tempfile::tempdir().unwrap();
        let pool = elastic(dir.path(), 5, 10, Duration::from_secs(5));

        let occupancy = pool.occupancy();
        assert_eq!(occupancy.pool_size, 5);
        assert_eq!(occupancy.max_overflow, 10);
        assert_eq!(occupancy.checked_out, 0);
        assert_eq!(occupancy.checked_in, 5);
    }

    #[test]
    fn checkout_counts_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let pool = elastic(dir.path(), 2, 1, Duration::from_secs(5));

        let first = pool.checkout().unwrap();
        let second = pool.checkout().unwrap();
        assert_eq!(pool.occupancy().checked_out, 2);
        assert_eq!(pool.tracker().outstanding(), 2);

        drop(first);
        drop(second);
        assert_eq!(pool.occupancy().checked_out, 0);
        assert_eq!(pool.tracker().outstanding(), 0);
    }

    #[test]
    fn exhausted_pool_times_out_with_retryable_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = elastic(dir.path(), 1, 1, Duration::from_millis(300));

        let _a = pool.checkout().unwrap();
        let _b = pool.checkout().unwrap();
        assert_eq!(pool.occupancy().overflow, 1);

        let started = std::time::Instant::now();
        let err = pool.checkout().unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert!(matches!(err, Error::PoolExhausted { pool: "blocking", .. }));
        assert!(err.is_retryable());
        assert_eq!(pool.tracker().timeouts(), 1);
    }

    #[test]
    fn only_broken_connections_count_as_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let pool = elastic(dir.path(), 1, 1, Duration::from_secs(5));
        let tracker = pool.tracker().clone();

        let healthy = pool.checkout().unwrap();
        let mut broken = pool.checkout().unwrap();
        broken.begin().unwrap();
        drop(healthy);
        drop(broken);
        assert_eq!(tracker.invalidated(), 1);

        drop(pool);
        assert_eq!(tracker.invalidated(), 1);
    }

    #[test]
    fn unbounded_checkout_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for timeout in [Duration::ZERO, Duration::MAX] {
            let result = BlockingPool::build_with(
                ConnectTarget::Sqlite {
                    path: dir.path().join("bounded.db"),
                },
                PoolStrategy::SharedSingle,
                timeout,
                SessionSetup::default(),
            );
            assert!(matches!(
                result,
                Err(Error::Config(ConfigError::InvalidValue {
                    field: "checkout_timeout",
                    ..
                }))
            ));
        }
    }

    #[tokio::test]
    async fn async_connect_applies_session_settings() {
        let dir = tempfile::tempdir().unwrap();
        let pool = AsyncPool::connect(&embedded_descriptor(dir.path()))
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let busy_ms = sqlx::query_scalar::<_, i64>("PRAGMA busy_timeout")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(busy_ms, EMBEDDED_BUSY_TIMEOUT.as_millis() as i64);
        drop(conn);
        pool.close().await;
    }

    #[tokio::test]
    async fn async_pool_acquires_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let pool = AsyncPool::connect(&embedded_descriptor(dir.path()))
            .await
            .unwrap();

        {
            let mut conn = pool.acquire().await.unwrap();
            sqlx::raw_sql("SELECT 1").execute(&mut *conn).await.unwrap();
        }

        pool.close().await;
        assert!(pool.is_closed());
        assert!(matches!(
            pool.acquire().await,
            Err(Error::PoolClosed { pool: "async" })
        ));
    }
}
