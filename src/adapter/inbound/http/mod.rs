//! Operational HTTP endpoints.
//!
//! - `GET /health` - aggregated health report, 503 when unhealthy
//! - `GET /pool-status` - blocking pool occupancy
//! - `POST /test-connection` - probe both pools on demand

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;

pub use handlers::OperatorState;

/// Build the ops router around a shared operator.
pub fn router(operator: OperatorState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/pool-status", get(handlers::pool_status))
        .route("/test-connection", post(handlers::test_connection))
        .with_state(operator)
}
