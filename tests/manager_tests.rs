//! End-to-end tests for the database manager over temporary SQLite stores.

mod support;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use poolkeeper::error::Error;
use poolkeeper::infrastructure::config::database::DatabaseSettings;
use poolkeeper::infrastructure::database::session;
use poolkeeper::infrastructure::database::{
    BackendKind, ConnectionDescriptor, DatabaseManager, HealthStatus, PoolStatus,
};

use support::{notes_schema, TempStore};

fn count_notes(conn: &mut poolkeeper::infrastructure::database::connection::StoreConnection) -> usize {
    // An unconditional UPDATE reports every row it touched.
    conn.execute("UPDATE notes SET body = body").unwrap()
}

#[tokio::test]
async fn embedded_store_creates_directory_and_skips_keep_alive() {
    let store = TempStore::new();
    let path = store.path("data").join("x.db");
    let settings = DatabaseSettings {
        sqlite_path: path.display().to_string(),
        ..DatabaseSettings::default()
    };

    let descriptor = ConnectionDescriptor::resolve(&settings).unwrap();
    assert!(path.parent().unwrap().is_dir());

    let manager = store.start_with(descriptor).await;
    assert_eq!(manager.kind(), BackendKind::Embedded);
    assert!(!manager.keep_alive_scheduled());
    assert_eq!(manager.keep_alive_fired(), None);
    assert!(manager.pool_status().occupancy().is_some());
    manager.shutdown().await;
}

#[test]
fn elastic_pool_reports_base_size_immediately() {
    let store = TempStore::new();
    let pool = store.elastic_pool(5, 10, Duration::from_secs(5));

    let occupancy = pool.occupancy();
    assert_eq!(occupancy.pool_size, 5);
    assert_eq!(occupancy.max_overflow, 10);
    assert_eq!(occupancy.checked_out, 0);
}

#[tokio::test]
async fn sequential_sessions_return_their_connection() {
    let store = TempStore::new();
    let manager = store.start().await;
    manager.create_tables(&notes_schema()).unwrap();

    for i in 0..5 {
        manager
            .acquire_session(|conn| {
                conn.execute(&format!("INSERT INTO notes (body) VALUES ('note {i}')"))?;
                Ok(())
            })
            .unwrap();
        let occupancy = *manager.pool_status().occupancy().unwrap();
        assert_eq!(occupancy.checked_out, 0);
    }

    let total = manager.acquire_session(|conn| Ok(count_notes(conn))).unwrap();
    assert_eq!(total, 5);
    manager.shutdown().await;
}

#[tokio::test]
async fn failing_sessions_roll_back_without_leaking_capacity() {
    let store = TempStore::new();
    let manager = store.start().await;
    manager.create_tables(&notes_schema()).unwrap();

    for _ in 0..20 {
        let result: Result<(), Error> = manager.acquire_session(|conn| {
            conn.execute("INSERT INTO notes (body) VALUES ('discarded')")?;
            Err(Error::Bootstrap {
                table: "notes".to_string(),
                reason: "simulated failure".to_string(),
            })
        });
        assert!(result.is_err());
    }

    let occupancy = *manager.pool_status().occupancy().unwrap();
    assert_eq!(occupancy.checked_out, 0);
    assert_eq!(occupancy.checked_in, 1);
    assert_eq!(manager.acquire_session(|conn| Ok(count_notes(conn))).unwrap(), 0);
    manager.shutdown().await;
}

#[tokio::test]
async fn panicking_session_discards_its_connection() {
    let store = TempStore::new();
    let manager = store.start().await;
    manager.create_tables(&notes_schema()).unwrap();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        manager.acquire_session(|conn| -> Result<(), Error> {
            conn.execute("INSERT INTO notes (body) VALUES ('half written')")?;
            panic!("handler bug");
        })
    }));
    assert!(outcome.is_err());

    // The open transaction marks the connection broken; the pool replaces it.
    let total = manager.acquire_session(|conn| Ok(count_notes(conn))).unwrap();
    assert_eq!(total, 0);
    assert!(manager.pool_status().occupancy().unwrap().invalidated >= 1);
    manager.shutdown().await;
}

#[test]
fn checkout_beyond_capacity_fails_after_timeout() {
    let store = TempStore::new();
    let pool = store.elastic_pool(2, 1, Duration::from_secs(1));

    let held: Vec<_> = (0..3).map(|_| pool.checkout().unwrap()).collect();
    assert_eq!(pool.occupancy().checked_out, 3);

    let started = std::time::Instant::now();
    let result = session::run_blocking(&pool, |_| Ok(()));
    let waited = started.elapsed();

    match result {
        Err(Error::PoolExhausted { timeout, .. }) => assert_eq!(timeout, Duration::from_secs(1)),
        other => panic!("expected pool exhaustion, got {other:?}"),
    }
    assert!(waited >= Duration::from_millis(900));

    drop(held);
    assert!(session::run_blocking(&pool, |_| Ok(())).is_ok());
}

#[tokio::test]
async fn async_session_commits_and_rolls_back() {
    let store = TempStore::new();
    let manager = store.start().await;
    manager.create_tables_async(&notes_schema()).await.unwrap();

    manager
        .acquire_session_async(|conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO notes (body) VALUES ('kept')")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap();

    let failed: Result<(), Error> = manager
        .acquire_session_async(|conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO notes (body) VALUES ('dropped')")
                    .execute(&mut *conn)
                    .await?;
                Err(Error::PoolClosed { pool: "async" })
            })
        })
        .await;
    assert!(failed.is_err());

    let count: i64 = manager
        .acquire_session_async(|conn| {
            Box::pin(async move {
                let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notes")
                    .fetch_one(&mut *conn)
                    .await?;
                Ok(count)
            })
        })
        .await
        .unwrap();
    assert_eq!(count, 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn create_tables_is_idempotent_across_both_paths() {
    let store = TempStore::new();
    let manager = store.start().await;

    let first = manager.create_tables(&notes_schema()).unwrap();
    assert_eq!(first.created, vec!["notes"]);

    let second = manager.create_tables(&notes_schema()).unwrap();
    assert_eq!(second.existing, vec!["notes"]);

    let third = manager.create_tables_async(&notes_schema()).await.unwrap();
    assert!(third.created.is_empty());
    assert_eq!(third.existing, vec!["notes"]);
    manager.shutdown().await;
}

#[tokio::test]
async fn health_tracks_probe_result() {
    let store = TempStore::new();
    let manager = store.start().await;

    let healthy = manager.check_health();
    assert_eq!(healthy.status, HealthStatus::Healthy);
    assert!(healthy.connection_test);
    assert!(healthy.error.is_none());

    let healthy_async = manager.check_health_async().await;
    assert_eq!(healthy_async.status, HealthStatus::Healthy);

    manager.shutdown().await;

    let report = manager.check_health();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert!(!report.connection_test);
    assert!(!report.error.as_deref().unwrap_or_default().is_empty());
    assert_eq!(report.pool_status, PoolStatus::unavailable());

    let report_async = manager.check_health_async().await;
    assert_eq!(report_async.status, HealthStatus::Unhealthy);
    assert!(report_async.error.is_some());
}

#[tokio::test]
async fn shutdown_twice_is_harmless() {
    let store = TempStore::new();
    let manager = store.start().await;

    manager.shutdown().await;
    manager.shutdown().await;
    manager.shutdown_blocking();

    assert!(matches!(
        manager.acquire_session(|_| Ok(())),
        Err(Error::PoolClosed { pool: "blocking" })
    ));
    assert!(matches!(
        manager.acquire_session_async(|_| Box::pin(async { Ok(()) })).await,
        Err(Error::PoolClosed { pool: "async" })
    ));
}

#[test]
fn shutdown_blocking_outside_runtime_closes_async_pool() {
    let store = TempStore::new();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let manager = runtime.block_on(store.start());

    manager.shutdown_blocking();

    assert!(manager.async_pool().is_closed());
    assert_eq!(manager.pool_status(), PoolStatus::unavailable());
}

#[tokio::test]
async fn keep_alive_pings_the_live_pool_until_shutdown() {
    let store = TempStore::new();
    let manager = store.start_keep_alive(Duration::from_millis(25)).await;
    assert!(manager.keep_alive_scheduled());

    let deadline = Instant::now() + Duration::from_secs(5);
    while manager.keep_alive_fired() < Some(3) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(manager.keep_alive_fired() >= Some(3));
    assert_eq!(manager.keep_alive_failures(), Some(0));

    manager.shutdown().await;
    assert!(!manager.keep_alive_scheduled());

    // A ping already running when shutdown began may still complete.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = manager.keep_alive_fired();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.keep_alive_fired(), settled);
}

#[tokio::test]
async fn unschedulable_keep_alive_fails_startup() {
    let store = TempStore::new();
    let pool = store.elastic_pool(1, 0, Duration::from_secs(2));

    let result =
        DatabaseManager::with_blocking_pool(store.descriptor(), pool, Some(Duration::MAX)).await;
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn connection_test_keeps_runtime_responsive_while_checkout_waits() {
    let store = TempStore::new();
    let descriptor = store
        .descriptor()
        .with_checkout_timeout(Duration::from_secs(1));
    let manager = store.start_with(descriptor).await;
    let held = manager.checkout().unwrap();

    let ticks = Arc::new(AtomicU32::new(0));
    let ticker = {
        let ticks = Arc::clone(&ticks);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(50)).await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let test = manager.test_both().await;
    ticker.abort();

    assert!(!test.sync_connection);
    assert!(test.async_connection);
    assert_eq!(test.overall_status, HealthStatus::Unhealthy);
    // The single-threaded test runtime kept ticking through the 1s wait.
    assert!(ticks.load(Ordering::SeqCst) >= 5);

    drop(held);
    manager.shutdown().await;
}
