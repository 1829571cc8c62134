//! Operator-facing capability surface for inbound adapters.

use async_trait::async_trait;

use crate::domain::backend::BackendKind;
use crate::domain::health::{ConnectionTest, HealthReport, PoolStatus};
use crate::domain::schema::{BootstrapSummary, Schema};
use crate::error::Result;

/// What the CLI and the ops endpoints may ask of a running store.
#[async_trait]
pub trait DatabaseOperator: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Store address with credentials redacted.
    fn address(&self) -> String;

    /// Blocking pool occupancy. Never probes.
    fn pool_status(&self) -> PoolStatus;

    /// Probe through the non-blocking pool and attach the pool snapshot.
    async fn health(&self) -> HealthReport;

    /// Probe both pools.
    async fn test_connections(&self) -> ConnectionTest;

    /// Create the tables of `schema` that are missing.
    async fn bootstrap(&self, schema: &Schema) -> Result<BootstrapSummary>;

    /// Release every connection. Safe to call more than once.
    async fn shutdown(&self);
}
