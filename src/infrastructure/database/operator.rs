//! [`DatabaseManager`] as the inbound operator port.

use async_trait::async_trait;

use crate::domain::backend::BackendKind;
use crate::domain::health::{ConnectionTest, HealthReport, PoolStatus};
use crate::domain::schema::{BootstrapSummary, Schema};
use crate::error::Result;
use crate::infrastructure::database::manager::DatabaseManager;
use crate::port::inbound::operator::DatabaseOperator;

#[async_trait]
impl DatabaseOperator for DatabaseManager {
    fn backend(&self) -> BackendKind {
        self.kind()
    }

    fn address(&self) -> String {
        self.descriptor().display_address()
    }

    fn pool_status(&self) -> PoolStatus {
        DatabaseManager::pool_status(self)
    }

    async fn health(&self) -> HealthReport {
        self.check_health_async().await
    }

    async fn test_connections(&self) -> ConnectionTest {
        self.test_both().await
    }

    async fn bootstrap(&self, schema: &Schema) -> Result<BootstrapSummary> {
        self.create_tables_async(schema).await
    }

    async fn shutdown(&self) {
        DatabaseManager::shutdown(self).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::health::HealthStatus;
    use crate::infrastructure::config::database::DatabaseSettings;
    use crate::infrastructure::database::profile::ConnectionDescriptor;

    async fn operator(dir: &tempfile::TempDir) -> Arc<dyn DatabaseOperator> {
        let settings = DatabaseSettings {
            sqlite_path: dir.path().join("operator.db").display().to_string(),
            ..DatabaseSettings::default()
        };
        let descriptor = ConnectionDescriptor::resolve(&settings).unwrap();
        Arc::new(DatabaseManager::start(descriptor).await.unwrap())
    }

    #[tokio::test]
    async fn operator_reports_through_the_manager() {
        let dir = tempfile::tempdir().unwrap();
        let operator = operator(&dir).await;

        assert_eq!(operator.backend(), BackendKind::Embedded);
        assert!(operator.address().starts_with("sqlite://"));
        assert!(operator.pool_status().occupancy().is_some());
        assert_eq!(operator.health().await.status, HealthStatus::Healthy);

        let schema = Schema::new().table("pings", "CREATE TABLE pings (id INTEGER PRIMARY KEY)");
        assert_eq!(operator.bootstrap(&schema).await.unwrap().created, ["pings"]);
        assert_eq!(operator.bootstrap(&schema).await.unwrap().existing, ["pings"]);

        operator.shutdown().await;
        operator.shutdown().await;
        let test = operator.test_connections().await;
        assert!(!test.sync_connection);
        assert!(!test.async_connection);
        assert_eq!(operator.pool_status(), PoolStatus::unavailable());
    }
}
