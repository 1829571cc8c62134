//! The database manager.
//!
//! [`DatabaseManager`] owns both pools and the keep-alive scheduler for one
//! [`ConnectionDescriptor`]. It is constructed once by the host at startup
//! and shared by `Arc` with whatever needs a session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use sqlx::AnyConnection;
use tracing::{debug, info, warn};

use crate::domain::backend::BackendKind;
use crate::domain::health::{ConnectionTest, HealthReport, PoolStatus, ProbeOutcome};
use crate::domain::schema::{BootstrapSummary, Schema};
use crate::error::{Error, Result};
use crate::infrastructure::database::connection::StoreConnection;
use crate::infrastructure::database::keepalive::{KeepAlive, Probe};
use crate::infrastructure::database::pool::{
    AsyncPool, BlockingPool, PooledStoreConnection, ASYNC_POOL, BLOCKING_POOL,
};
use crate::infrastructure::database::profile::ConnectionDescriptor;
use crate::infrastructure::database::schema;
use crate::infrastructure::database::session;

const PROBE_SQL: &str = "SELECT 1";

type BlockingSlot = Arc<RwLock<Option<BlockingPool>>>;

/// Connection lifecycle manager for one store.
#[derive(Debug)]
pub struct DatabaseManager {
    descriptor: ConnectionDescriptor,
    blocking: BlockingSlot,
    async_pool: AsyncPool,
    keep_alive: Mutex<Option<KeepAlive>>,
    shut_down: AtomicBool,
}

impl DatabaseManager {
    /// Build both pools and, for networked stores, start keep-alive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the backend is not compiled in and
    /// [`Error::PoolBuild`] if either pool cannot reach the store.
    pub async fn start(descriptor: ConnectionDescriptor) -> Result<Self> {
        info!(
            backend = %descriptor.kind(),
            address = %descriptor.display_address(),
            "Starting database manager"
        );

        let blocking = {
            let descriptor = descriptor.clone();
            tokio::task::spawn_blocking(move || BlockingPool::build(&descriptor))
                .await
                .map_err(|e| Error::PoolBuild {
                    pool: BLOCKING_POOL,
                    reason: e.to_string(),
                })??
        };
        let keep_alive_interval = descriptor.keep_alive_interval();
        Self::with_blocking_pool(descriptor, blocking, keep_alive_interval).await
    }

    /// Start around an already built blocking pool.
    ///
    /// The non-blocking pool still comes from `descriptor`. Keep-alive is
    /// scheduled every `keep_alive_interval` when one is given, whatever the
    /// descriptor's profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolBuild`] if the non-blocking pool cannot reach the
    /// store and [`Error::Config`] if the interval cannot be scheduled.
    pub async fn with_blocking_pool(
        descriptor: ConnectionDescriptor,
        blocking: BlockingPool,
        keep_alive_interval: Option<Duration>,
    ) -> Result<Self> {
        let async_pool = AsyncPool::connect(&descriptor).await?;
        let blocking: BlockingSlot = Arc::new(RwLock::new(Some(blocking)));

        let keep_alive = match keep_alive_interval {
            Some(interval) => {
                match KeepAlive::start(interval, keep_alive_probe(Arc::clone(&blocking))) {
                    Ok(keep_alive) => Some(keep_alive),
                    Err(e) => {
                        async_pool.close().await;
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        Ok(Self {
            descriptor,
            blocking,
            async_pool,
            keep_alive: Mutex::new(keep_alive),
            shut_down: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.descriptor.kind()
    }

    /// True while the keep-alive scheduler is armed.
    #[must_use]
    pub fn keep_alive_scheduled(&self) -> bool {
        self.keep_alive
            .lock()
            .as_ref()
            .is_some_and(KeepAlive::is_scheduled)
    }

    /// Keep-alive probes run so far, `None` if keep-alive was never started.
    #[must_use]
    pub fn keep_alive_fired(&self) -> Option<u64> {
        self.keep_alive.lock().as_ref().map(KeepAlive::fired)
    }

    /// Keep-alive probes that failed, `None` if keep-alive was never started.
    #[must_use]
    pub fn keep_alive_failures(&self) -> Option<u64> {
        self.keep_alive.lock().as_ref().map(KeepAlive::failures)
    }

    /// The blocking pool, unless it has been disposed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolClosed`] after shutdown.
    pub fn blocking_pool(&self) -> Result<BlockingPool> {
        current_pool(&self.blocking)
    }

    #[must_use]
    pub fn async_pool(&self) -> &AsyncPool {
        &self.async_pool
    }

    /// Check out a raw connection from the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolClosed`] after shutdown and
    /// [`Error::PoolExhausted`] if the checkout times out.
    pub fn checkout(&self) -> Result<PooledStoreConnection> {
        self.blocking_pool()?.checkout()
    }

    /// Run `f` as one blocking unit of work.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`.
    ///
    /// # Errors
    ///
    /// Pool errors from checkout, transaction errors, or the error `f` returned.
    pub fn acquire_session<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut StoreConnection) -> Result<T>,
    {
        session::run_blocking(&self.blocking_pool()?, f)
    }

    /// Run `f` as one non-blocking unit of work.
    ///
    /// The closure gets the transaction's connection and returns a boxed
    /// future borrowing it.
    ///
    /// ```no_run
    /// # use poolkeeper::infrastructure::database::DatabaseManager;
    /// # async fn run(manager: &DatabaseManager) -> poolkeeper::error::Result<()> {
    /// let inserted = manager
    ///     .acquire_session_async(|conn| {
    ///         Box::pin(async move {
    ///             let done = sqlx::query("INSERT INTO notes (body) VALUES ('hello')")
    ///                 .execute(&mut *conn)
    ///                 .await?;
    ///             Ok(done.rows_affected())
    ///         })
    ///     })
    ///     .await?;
    /// assert_eq!(inserted, 1);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Pool errors from acquisition, transaction errors, or the error `f`
    /// returned.
    pub async fn acquire_session_async<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, Result<T>>,
    {
        session::run_async(&self.async_pool, f).await
    }

    /// Occupancy of the blocking pool. Never mutates pool state.
    #[must_use]
    pub fn pool_status(&self) -> PoolStatus {
        match self.blocking.read().as_ref() {
            Some(pool) => PoolStatus::Available(pool.occupancy()),
            None => PoolStatus::unavailable(),
        }
    }

    /// Blocking connectivity probe. Failures are reported, never returned.
    #[must_use]
    pub fn test_connection(&self) -> ProbeOutcome {
        blocking_check(&self.blocking)
    }

    /// Non-blocking connectivity probe. Failures are reported, never returned.
    pub async fn test_connection_async(&self) -> ProbeOutcome {
        let result = async {
            let mut conn = self.async_pool.acquire().await?;
            sqlx::query(PROBE_SQL).execute(&mut *conn).await?;
            Ok::<_, Error>(())
        }
        .await;
        let outcome = ProbeOutcome::from_result(result);
        log_probe(ASYNC_POOL, &outcome);
        outcome
    }

    /// Blocking probe combined with the pool snapshot.
    #[must_use]
    pub fn check_health(&self) -> HealthReport {
        HealthReport::from_probe(self.kind(), self.test_connection(), self.pool_status())
    }

    /// Non-blocking probe combined with the pool snapshot.
    pub async fn check_health_async(&self) -> HealthReport {
        let probe = self.test_connection_async().await;
        HealthReport::from_probe(self.kind(), probe, self.pool_status())
    }

    /// Test both pools. The blocking check runs on the blocking thread pool,
    /// so a slow checkout never stalls a runtime worker.
    pub async fn test_both(&self) -> ConnectionTest {
        let slot = Arc::clone(&self.blocking);
        let sync = tokio::task::spawn_blocking(move || blocking_check(&slot))
            .await
            .unwrap_or_else(|e| {
                warn!(pool = BLOCKING_POOL, error = %e, "Blocking connection test task failed");
                ProbeOutcome::failed(e)
            });
        let async_ = self.test_connection_async().await;
        ConnectionTest::from_probes(self.kind(), sync, async_)
    }

    /// Create the tables of `schema` that do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bootstrap`] if a table cannot be created, or a pool
    /// error if no connection is available.
    pub fn create_tables(&self, schema: &Schema) -> Result<BootstrapSummary> {
        let mut conn = self.checkout()?;
        schema::apply_blocking(&mut conn, schema)
    }

    /// Non-blocking variant of [`DatabaseManager::create_tables`].
    ///
    /// # Errors
    ///
    /// Same as [`DatabaseManager::create_tables`].
    pub async fn create_tables_async(&self, schema: &Schema) -> Result<BootstrapSummary> {
        let mut conn = self.async_pool.acquire().await?;
        schema::apply_async(&mut conn, self.kind(), schema).await
    }

    /// Cancel keep-alive and dispose both pools.
    ///
    /// Safe to call more than once; never fails.
    pub async fn shutdown(&self) {
        self.dispose_blocking_side();
        self.async_pool.close().await;
        debug!(pool = ASYNC_POOL, "Pool disposed");
        self.log_shutdown();
    }

    /// Shutdown for callers that may be outside the async runtime.
    ///
    /// Inside a runtime, closing the async pool is spawned onto it; outside,
    /// a temporary runtime drives it to completion.
    pub fn shutdown_blocking(&self) {
        self.dispose_blocking_side();
        let pool = self.async_pool.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { pool.close().await });
            }
            Err(_) => match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime.block_on(pool.close()),
                Err(e) => warn!(pool = ASYNC_POOL, error = %e, "Cannot build runtime to close pool"),
            },
        }
        self.log_shutdown();
    }

    fn dispose_blocking_side(&self) {
        // The handle stays in place so its counters remain readable.
        if let Some(keep_alive) = self.keep_alive.lock().as_ref() {
            if keep_alive.is_scheduled() {
                keep_alive.cancel();
                debug!(fired = keep_alive.fired(), "Keep-alive stopped");
            }
        }
        if self.blocking.write().take().is_some() {
            debug!(pool = BLOCKING_POOL, "Pool disposed");
        }
    }

    fn log_shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            info!(backend = %self.kind(), "Database connections closed");
        }
    }
}

fn current_pool(slot: &BlockingSlot) -> Result<BlockingPool> {
    slot.read()
        .clone()
        .ok_or(Error::PoolClosed {
            pool: BLOCKING_POOL,
        })
}

fn ping_blocking(slot: &BlockingSlot) -> Result<()> {
    let pool = current_pool(slot)?;
    let mut conn = pool.checkout()?;
    conn.ping()?;
    Ok(())
}

fn blocking_check(slot: &BlockingSlot) -> ProbeOutcome {
    let outcome = ProbeOutcome::from_result(ping_blocking(slot));
    log_probe(BLOCKING_POOL, &outcome);
    outcome
}

fn keep_alive_probe(slot: BlockingSlot) -> Probe {
    Box::new(move || ping_blocking(&slot))
}

fn log_probe(pool: &'static str, outcome: &ProbeOutcome) {
    if let Some(error) = &outcome.error {
        warn!(pool, error = %error, "Connection test failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::database::DatabaseSettings;

    async fn embedded(dir: &tempfile::TempDir) -> DatabaseManager {
        let settings = DatabaseSettings {
            sqlite_path: dir.path().join("manager.db").display().to_string(),
            ..DatabaseSettings::default()
        };
        let descriptor = ConnectionDescriptor::resolve(&settings).unwrap();
        DatabaseManager::start(descriptor).await.unwrap()
    }

    #[tokio::test]
    async fn embedded_start_schedules_no_keep_alive() {
        let dir = tempfile::tempdir().unwrap();
        let manager = embedded(&dir).await;

        assert_eq!(manager.kind(), BackendKind::Embedded);
        assert!(!manager.keep_alive_scheduled());
        assert!(manager.test_connection().connected);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_marks_pool_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let manager = embedded(&dir).await;

        manager.shutdown().await;
        assert_eq!(manager.pool_status(), PoolStatus::unavailable());
        assert!(matches!(
            manager.checkout(),
            Err(Error::PoolClosed { pool: "blocking" })
        ));
        assert!(manager.async_pool().is_closed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_blocking_inside_runtime_spawns_close() {
        let dir = tempfile::tempdir().unwrap();
        let manager = embedded(&dir).await;

        manager.shutdown_blocking();
        assert!(manager.blocking_pool().is_err());
        // The spawned close completes shortly after.
        for _ in 0..100 {
            if manager.async_pool().is_closed() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(manager.async_pool().is_closed());
    }
}
