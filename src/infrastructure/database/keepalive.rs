//! Keep-alive scheduler.
//!
//! A detached background thread that periodically runs a liveness probe so
//! the remote store does not silently drop idle pooled connections. The
//! thread is driven by an explicit [`KeepAliveState`]: it fires while
//! `Scheduled` and exits once [`KeepAlive::cancel`] moves it to `Idle`.
//!
//! Probe outcome never affects scheduling. Every fire is followed by a
//! re-arm for another interval unless the scheduler was cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

/// Liveness probe run on every fire.
pub type Probe = Box<dyn Fn() -> Result<()> + Send + 'static>;

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveState {
    /// Not armed. The background thread exits when it observes this.
    Idle,
    /// Armed to fire at `next_fire`.
    Scheduled { next_fire: Instant },
}

#[derive(Debug)]
struct Shared {
    state: Mutex<KeepAliveState>,
    wake: Condvar,
    fired: AtomicU64,
    failures: AtomicU64,
}

/// Handle to a running keep-alive scheduler.
///
/// Dropping the handle cancels the scheduler.
#[derive(Debug)]
pub struct KeepAlive {
    shared: Arc<Shared>,
    interval: Duration,
}

impl KeepAlive {
    /// Arm the scheduler and spawn its thread.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Config`] if `interval` is zero or too
    /// large to schedule, and [`crate::error::Error::Io`] if the thread cannot
    /// be spawned.
    pub fn start(interval: Duration, probe: Probe) -> Result<Self> {
        let next_fire = match next_fire(interval) {
            Some(at) if !interval.is_zero() => at,
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "keep_alive_interval",
                    reason: format!("cannot schedule every {interval:?}"),
                }
                .into())
            }
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(KeepAliveState::Scheduled { next_fire }),
            wake: Condvar::new(),
            fired: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });

        let worker = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("poolkeeper-keepalive".to_string())
            .spawn(move || run(&worker, interval, &probe))?;

        info!(interval_secs = interval.as_secs(), "Keep-alive scheduled");
        Ok(Self { shared, interval })
    }

    /// Stop scheduling further probes. A probe already running completes.
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        if matches!(*state, KeepAliveState::Scheduled { .. }) {
            *state = KeepAliveState::Idle;
            self.shared.wake.notify_all();
            debug!("Keep-alive cancelled");
        }
    }

    #[must_use]
    pub fn state(&self) -> KeepAliveState {
        *self.shared.state.lock()
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        matches!(self.state(), KeepAliveState::Scheduled { .. })
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probes run so far.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.shared.fired.load(Ordering::Relaxed)
    }

    /// Probes that returned an error.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn run(shared: &Shared, interval: Duration, probe: &Probe) {
    let mut state = shared.state.lock();
    loop {
        let KeepAliveState::Scheduled { next_fire } = *state else {
            break;
        };
        if Instant::now() < next_fire {
            // Woken early by cancel or spuriously; the loop re-reads the state.
            shared.wake.wait_until(&mut state, next_fire);
            continue;
        }

        let result = MutexGuard::unlocked(&mut state, || probe());
        shared.fired.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(()) => debug!("Keep-alive probe succeeded"),
            Err(e) => {
                shared.failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Keep-alive probe failed");
            }
        }

        if matches!(*state, KeepAliveState::Scheduled { .. }) {
            *state = match self::next_fire(interval) {
                Some(next_fire) => KeepAliveState::Scheduled { next_fire },
                None => {
                    warn!("Keep-alive interval overflows the clock; stopping");
                    KeepAliveState::Idle
                }
            };
        }
    }
    debug!("Keep-alive thread stopped");
}

fn next_fire(interval: Duration) -> Option<Instant> {
    Instant::now().checked_add(interval)
}
