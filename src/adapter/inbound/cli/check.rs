//! Handler for the `check` command.

use serde_json::json;

use crate::adapter::inbound::cli::output;
use crate::domain::health::HealthStatus;
use crate::port::inbound::operator::DatabaseOperator;

/// Probe both pools once. Returns the overall verdict.
pub async fn execute(operator: &dyn DatabaseOperator) -> HealthStatus {
    let test = operator.test_connections().await;
    let pool_status = operator.pool_status();

    if output::is_json() {
        output::json(&json!({
            "command": "check",
            "address": operator.address(),
            "connection_test": test,
            "pool_status": pool_status,
        }));
    } else {
        output::header(env!("CARGO_PKG_VERSION"));
        output::field("Database", operator.backend());
        output::field("Address", operator.address());

        output::section("Connection Check");
        output::check(test.sync_connection, "Blocking pool");
        output::check(test.async_connection, "Async pool");
        for error in &test.errors {
            output::warning(error);
        }
        if let Some(occupancy) = pool_status.occupancy() {
            output::field(
                "Pool",
                output::muted(format!(
                    "{} open, {} checked out",
                    occupancy.checked_in + occupancy.checked_out,
                    occupancy.checked_out
                )),
            );
        }
    }

    test.overall_status
}
