//! Pool lifecycle hooks.
//!
//! Three r2d2 extension points are used:
//! - [`SessionSetup`] runs once per physical connection right after connect.
//! - [`CheckoutTracker`] records checkout time per connection and warns on
//!   long holds at checkin.
//! - [`LogErrorHandler`] routes pool-internal errors to `tracing`.
//!
//! None of the hooks can fail the pool operation that triggered them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use diesel::r2d2::Error as DriverError;
use r2d2::event::{AcquireEvent, CheckinEvent, CheckoutEvent, ReleaseEvent, TimeoutEvent};
use r2d2::{CustomizeConnection, HandleError, HandleEvent};
use tracing::{debug, warn};

use crate::infrastructure::database::connection::StoreConnection;
use crate::infrastructure::database::profile::{ConnectionDescriptor, SessionVariable};

/// Holding a connection longer than this emits a warning at checkin.
pub const LONG_CHECKOUT_THRESHOLD: Duration = Duration::from_secs(10);

/// Per-connection settings applied on physical connect.
#[derive(Debug, Clone, Default)]
pub struct SessionSetup {
    statements: Vec<String>,
    echo: bool,
}

impl SessionSetup {
    /// Build the setup for a descriptor.
    ///
    /// Networked connections get their session variables; embedded ones get
    /// the busy timeout.
    #[must_use]
    pub fn for_descriptor(descriptor: &ConnectionDescriptor) -> Self {
        let mut statements: Vec<String> = descriptor
            .session_variables()
            .iter()
            .map(SessionVariable::statement)
            .collect();
        if let Some(busy) = descriptor.timeouts().busy {
            statements.push(format!("PRAGMA busy_timeout = {}", busy.as_millis()));
        }
        Self {
            statements,
            echo: descriptor.echo(),
        }
    }

    #[must_use]
    pub fn with_statements(statements: Vec<String>) -> Self {
        Self {
            statements,
            echo: false,
        }
    }

    #[must_use]
    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

impl CustomizeConnection<StoreConnection, DriverError> for SessionSetup {
    fn on_acquire(&self, conn: &mut StoreConnection) -> Result<(), DriverError> {
        if self.echo {
            conn.enable_echo();
        }
        for statement in &self.statements {
            if let Err(e) = conn.batch_execute(statement) {
                warn!(statement = %statement, error = %e, "Failed to apply session setting");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    checked_out_at: DashMap<u64, Instant>,
    slow_checkins: AtomicU64,
    invalidated: AtomicU64,
    timeouts: AtomicU64,
}

/// Checkout-duration tracker attached to the blocking pool.
///
/// Clones share state, so the manager keeps one handle for reading counters
/// while the pool owns another.
#[derive(Debug, Clone)]
pub struct CheckoutTracker {
    pool: &'static str,
    threshold: Duration,
    max_age: Option<Duration>,
    state: Arc<TrackerState>,
}

impl CheckoutTracker {
    #[must_use]
    pub fn new(pool: &'static str) -> Self {
        Self::with_threshold(pool, LONG_CHECKOUT_THRESHOLD)
    }

    #[must_use]
    pub fn with_threshold(pool: &'static str, threshold: Duration) -> Self {
        Self {
            pool,
            threshold,
            max_age: None,
            state: Arc::new(TrackerState::default()),
        }
    }

    /// Count connections released at or past `max_age` as aged out.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Connections currently carrying a checkout timestamp.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.state.checked_out_at.len()
    }

    /// Checkins that exceeded the long-hold threshold.
    #[must_use]
    pub fn slow_checkins(&self) -> u64 {
        self.state.slow_checkins.load(Ordering::Relaxed)
    }

    /// Connections discarded as broken, failing validation or aged out.
    ///
    /// Idle reaping and closes at pool drop are not counted.
    #[must_use]
    pub fn invalidated(&self) -> u64 {
        self.state.invalidated.load(Ordering::Relaxed)
    }

    /// Checkouts that gave up waiting.
    #[must_use]
    pub fn timeouts(&self) -> u64 {
        self.state.timeouts.load(Ordering::Relaxed)
    }

    pub(crate) fn record_invalidated(&self, reason: &'static str) {
        self.state.invalidated.fetch_add(1, Ordering::Relaxed);
        debug!(pool = self.pool, reason, "Connection invalidated");
    }

    fn record_checkout(&self, id: u64) {
        self.state.checked_out_at.insert(id, Instant::now());
    }

    fn record_checkin(&self, id: u64) -> Option<Duration> {
        let (_, started) = self.state.checked_out_at.remove(&id)?;
        let held = started.elapsed();
        if held > self.threshold {
            self.state.slow_checkins.fetch_add(1, Ordering::Relaxed);
            warn!(
                pool = self.pool,
                connection = id,
                held_ms = held.as_millis() as u64,
                "Long-running connection checkout"
            );
        }
        Some(held)
    }
}

impl HandleEvent for CheckoutTracker {
    fn handle_acquire(&self, event: AcquireEvent) {
        debug!(pool = self.pool, connection = event.connection_id(), "Opened connection");
    }

    fn handle_release(&self, event: ReleaseEvent) {
        self.state.checked_out_at.remove(&event.connection_id());
        if self.max_age.is_some_and(|max_age| event.age() >= max_age) {
            self.record_invalidated("aged out");
        }
        debug!(
            pool = self.pool,
            connection = event.connection_id(),
            age_ms = event.age().as_millis() as u64,
            "Closed connection"
        );
    }

    fn handle_checkout(&self, event: CheckoutEvent) {
        self.record_checkout(event.connection_id());
    }

    fn handle_timeout(&self, event: TimeoutEvent) {
        self.state.timeouts.fetch_add(1, Ordering::Relaxed);
        warn!(
            pool = self.pool,
            timeout_ms = event.timeout().as_millis() as u64,
            "Connection checkout timed out"
        );
    }

    fn handle_checkin(&self, event: CheckinEvent) {
        self.record_checkin(event.connection_id());
    }
}

/// Sends pool-internal errors (failed connects, failed validation) to `tracing`.
#[derive(Debug, Clone, Copy)]
pub struct LogErrorHandler {
    pub pool: &'static str,
}

impl HandleError<DriverError> for LogErrorHandler {
    fn handle_error(&self, error: DriverError) {
        warn!(pool = self.pool, error = %error, "Connection pool error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::database::DatabaseSettings;

    #[test]
    fn checkin_clears_timestamp() {
        let tracker = CheckoutTracker::new("blocking");
        tracker.record_checkout(7);
        assert_eq!(tracker.outstanding(), 1);

        let held = tracker.record_checkin(7).unwrap();
        assert!(held < LONG_CHECKOUT_THRESHOLD);
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(tracker.slow_checkins(), 0);
    }

    #[test]
    fn long_hold_is_counted_not_rejected() {
        let tracker = CheckoutTracker::with_threshold("blocking", Duration::from_millis(5));
        tracker.record_checkout(1);
        std::thread::sleep(Duration::from_millis(20));

        assert!(tracker.record_checkin(1).is_some());
        assert_eq!(tracker.slow_checkins(), 1);
    }

    #[test]
    fn invalidations_are_counted_by_reason_not_by_close() {
        let tracker = CheckoutTracker::new("blocking").with_max_age(Some(Duration::from_secs(60)));
        assert_eq!(tracker.invalidated(), 0);

        tracker.record_invalidated("broken");
        tracker.record_invalidated("failed validation");
        assert_eq!(tracker.invalidated(), 2);
    }

    #[test]
    fn checkin_without_checkout_is_ignored() {
        let tracker = CheckoutTracker::new("blocking");
        assert!(tracker.record_checkin(42).is_none());
        assert_eq!(tracker.slow_checkins(), 0);
    }

    #[test]
    fn clones_share_counters() {
        let tracker = CheckoutTracker::new("blocking");
        let observer = tracker.clone();
        tracker.record_checkout(3);
        assert_eq!(observer.outstanding(), 1);
    }

    #[test]
    fn embedded_setup_applies_busy_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DatabaseSettings {
            sqlite_path: dir.path().join("x.db").display().to_string(),
            ..DatabaseSettings::default()
        };
        let descriptor = ConnectionDescriptor::resolve(&settings).unwrap();

        let setup = SessionSetup::for_descriptor(&descriptor);
        assert_eq!(setup.statements(), ["PRAGMA busy_timeout = 20000"]);
    }

    #[test]
    fn failing_statement_does_not_abort_connect() {
        use r2d2::ManageConnection;

        use crate::infrastructure::database::connection::{ConnectTarget, StoreConnectionManager};

        let dir = tempfile::tempdir().unwrap();
        let manager = StoreConnectionManager::new(ConnectTarget::Sqlite {
            path: dir.path().join("x.db"),
        });
        let mut conn = manager.connect().unwrap();
        let setup = SessionSetup::with_statements(vec![
            "SET SESSION autocommit=0".to_string(),
            "PRAGMA busy_timeout = 1000".to_string(),
        ]);

        assert!(setup.on_acquire(&mut conn).is_ok());
        assert!(conn.ping().is_ok());
    }
}
