//! Handler for the `pool-status` command.

use serde_json::json;

use crate::adapter::inbound::cli::output;
use crate::domain::health::PoolStatus;
use crate::port::inbound::operator::DatabaseOperator;

/// Print the blocking pool occupancy.
pub fn execute(operator: &dyn DatabaseOperator) {
    let status = operator.pool_status();

    if output::is_json() {
        output::json(&json!({
            "database_type": operator.backend(),
            "pool_status": status,
            "status": "active",
        }));
        return;
    }

    output::section("Pool Status");
    output::field("Database", operator.backend());
    match &status {
        PoolStatus::Available(occupancy) => {
            output::field("Pool size", occupancy.pool_size);
            output::field("Max overflow", occupancy.max_overflow);
            output::field("Checked in", occupancy.checked_in);
            output::field("Checked out", occupancy.checked_out);
            output::field("Overflow", occupancy.overflow);
            output::field("Invalidated", occupancy.invalidated);
        }
        PoolStatus::Unavailable { status } => output::warning(status),
    }
}
