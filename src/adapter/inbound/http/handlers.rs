use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::backend::BackendKind;
use crate::domain::health::{ConnectionTest, PoolStatus};
use crate::port::inbound::operator::DatabaseOperator;

/// Shared handler state.
pub type OperatorState = Arc<dyn DatabaseOperator>;

/// Body of `GET /pool-status`.
#[derive(Debug, Serialize)]
pub struct PoolStatusBody {
    pub database_type: BackendKind,
    pub pool_status: PoolStatus,
    pub status: &'static str,
}

/// GET /health - probe through the async pool and report.
///
/// Returns 200 with the report if healthy, 503 with the same report if not.
#[axum::debug_handler]
pub async fn health(State(operator): State<OperatorState>) -> Response {
    let report = operator.health().await;
    let code = if report.status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report)).into_response()
}

/// GET /pool-status - passive occupancy read, no probe.
#[axum::debug_handler]
pub async fn pool_status(State(operator): State<OperatorState>) -> Json<PoolStatusBody> {
    Json(PoolStatusBody {
        database_type: operator.backend(),
        pool_status: operator.pool_status(),
        status: "active",
    })
}

/// POST /test-connection - probe both pools.
#[axum::debug_handler]
pub async fn test_connection(State(operator): State<OperatorState>) -> Json<ConnectionTest> {
    Json(operator.test_connections().await)
}
