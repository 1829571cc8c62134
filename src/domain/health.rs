//! Health and diagnostics types.
//!
//! Every value here is computed on demand and never cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::backend::BackendKind;

/// Occupancy counters of the blocking pool at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOccupancy {
    /// Connections the pool keeps open.
    pub pool_size: u32,
    /// Extra connections allowed under load.
    pub max_overflow: u32,
    pub checked_in: u32,
    pub checked_out: u32,
    /// Open connections beyond `pool_size`.
    pub overflow: u32,
    /// Connections the pool has discarded since start.
    pub invalidated: u64,
}

/// Pool snapshot, or an explicit marker when counters cannot be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PoolStatus {
    Available(PoolOccupancy),
    Unavailable { status: String },
}

impl PoolStatus {
    #[must_use]
    pub fn unavailable() -> Self {
        Self::Unavailable {
            status: "Pool information not available".to_string(),
        }
    }

    #[must_use]
    pub fn occupancy(&self) -> Option<&PoolOccupancy> {
        match self {
            Self::Available(occupancy) => Some(occupancy),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Result of a connectivity probe. Probes report failures here instead of
/// returning an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeOutcome {
    #[must_use]
    pub fn connected() -> Self {
        Self {
            connected: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            connected: false,
            error: Some(error.to_string()),
        }
    }

    pub(crate) fn from_result<E: ToString>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::connected(),
            Err(e) => Self::failed(e),
        }
    }
}

/// Aggregated health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    #[must_use]
    pub fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Point-in-time health of the store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub database_type: BackendKind,
    pub connection_test: bool,
    pub pool_status: PoolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// Combine a probe result with a pool snapshot. Unhealthy exactly when
    /// the probe failed.
    #[must_use]
    pub fn from_probe(database_type: BackendKind, probe: ProbeOutcome, pool_status: PoolStatus) -> Self {
        let status = if probe.connected {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        Self {
            status,
            database_type,
            connection_test: probe.connected,
            pool_status,
            error: probe.error,
            timestamp: Utc::now(),
        }
    }
}

/// Result of probing both pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTest {
    pub sync_connection: bool,
    pub async_connection: bool,
    pub database_type: BackendKind,
    pub overall_status: HealthStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ConnectionTest {
    #[must_use]
    pub fn from_probes(database_type: BackendKind, sync: ProbeOutcome, async_: ProbeOutcome) -> Self {
        let overall_status = if sync.connected && async_.connected {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        Self {
            sync_connection: sync.connected,
            async_connection: async_.connected,
            database_type,
            overall_status,
            errors: sync.error.into_iter().chain(async_.error).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn occupancy() -> PoolOccupancy {
        PoolOccupancy {
            pool_size: 5,
            max_overflow: 10,
            checked_in: 5,
            checked_out: 0,
            overflow: 0,
            invalidated: 0,
        }
    }

    #[test]
    fn failed_probe_makes_report_unhealthy() {
        let report = HealthReport::from_probe(
            BackendKind::Networked,
            ProbeOutcome::failed("connection refused"),
            PoolStatus::Available(occupancy()),
        );

        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(!report.connection_test);
        assert_eq!(report.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn report_serializes_with_lowercase_status_and_flat_pool() {
        let report = HealthReport::from_probe(
            BackendKind::Embedded,
            ProbeOutcome::connected(),
            PoolStatus::Available(occupancy()),
        );
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["status"], "healthy");
        assert_eq!(value["database_type"], "sqlite");
        assert_eq!(value["pool_status"]["pool_size"], 5);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn unavailable_pool_status_is_explicit_marker() {
        let value = serde_json::to_value(PoolStatus::unavailable()).unwrap();
        assert_eq!(value, json!({ "status": "Pool information not available" }));
        assert!(PoolStatus::unavailable().occupancy().is_none());
    }

    #[test]
    fn connection_test_requires_both_probes() {
        let test = ConnectionTest::from_probes(
            BackendKind::Embedded,
            ProbeOutcome::connected(),
            ProbeOutcome::failed("pool is closed"),
        );
        assert!(test.sync_connection);
        assert!(!test.async_connection);
        assert_eq!(test.overall_status, HealthStatus::Unhealthy);
        assert_eq!(test.errors, vec!["pool is closed".to_string()]);
    }
}
