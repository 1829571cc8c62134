//! Handler for the `init-db` command.

use serde_json::json;

use crate::adapter::inbound::cli::output;
use crate::domain::schema::Schema;
use crate::error::Result;
use crate::port::inbound::operator::DatabaseOperator;

/// Tables this service owns.
#[must_use]
pub fn builtin_schema() -> Schema {
    Schema::new().table(
        "service_heartbeat",
        "CREATE TABLE service_heartbeat (\
         id INTEGER PRIMARY KEY, \
         service VARCHAR(64) NOT NULL, \
         checked_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)",
    )
}

/// Create the built-in tables if missing.
pub async fn execute(operator: &dyn DatabaseOperator) -> Result<()> {
    let summary = operator.bootstrap(&builtin_schema()).await?;

    if output::is_json() {
        output::json(&json!({
            "command": "init-db",
            "database_type": operator.backend(),
            "created": summary.created,
            "existing": summary.existing,
        }));
        return Ok(());
    }

    output::section("Database Bootstrap");
    for table in &summary.created {
        output::success(&format!("Created {table}"));
    }
    for table in &summary.existing {
        output::success(&format!("{table} {}", output::muted("already exists")));
    }
    Ok(())
}
