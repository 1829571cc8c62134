#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use poolkeeper::infrastructure::config::database::DatabaseSettings;
use poolkeeper::infrastructure::database::connection::ConnectTarget;
use poolkeeper::infrastructure::database::instrument::SessionSetup;
use poolkeeper::infrastructure::database::pool::{BlockingPool, PoolStrategy};
use poolkeeper::infrastructure::database::profile::PoolSizing;
use poolkeeper::infrastructure::database::{ConnectionDescriptor, DatabaseManager, Schema};
use tempfile::TempDir;

/// Temporary SQLite store for integration tests. The directory is removed on drop.
pub struct TempStore {
    dir: TempDir,
}

impl TempStore {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    pub fn settings(&self) -> DatabaseSettings {
        DatabaseSettings {
            sqlite_path: self.path("store.db").display().to_string(),
            ..DatabaseSettings::default()
        }
    }

    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::resolve(&self.settings()).expect("resolve descriptor")
    }

    pub async fn start(&self) -> DatabaseManager {
        self.start_with(self.descriptor()).await
    }

    pub async fn start_with(&self, descriptor: ConnectionDescriptor) -> DatabaseManager {
        DatabaseManager::start(descriptor)
            .await
            .expect("start manager")
    }

    /// Manager over an elastic pool with keep-alive armed, the way a
    /// networked store runs.
    pub async fn start_keep_alive(&self, interval: Duration) -> DatabaseManager {
        let pool = self.elastic_pool(2, 1, Duration::from_secs(2));
        DatabaseManager::with_blocking_pool(self.descriptor(), pool, Some(interval))
            .await
            .expect("start manager with keep-alive")
    }

    /// Elastic pool over a SQLite file, sized like a networked store.
    pub fn elastic_pool(&self, base: u32, overflow: u32, timeout: Duration) -> BlockingPool {
        BlockingPool::build_with(
            ConnectTarget::Sqlite {
                path: self.path("elastic.db"),
            },
            PoolStrategy::Elastic {
                sizing: PoolSizing { base, overflow },
                max_age: Some(Duration::from_secs(3600)),
            },
            timeout,
            SessionSetup::with_statements(vec!["PRAGMA busy_timeout = 5000".to_string()]),
        )
        .expect("build elastic pool")
    }
}

pub fn notes_schema() -> Schema {
    Schema::new().table(
        "notes",
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)",
    )
}
