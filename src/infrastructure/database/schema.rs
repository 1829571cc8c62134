//! Idempotent table bootstrap.
//!
//! Each table is looked up in the store catalog before its `CREATE` runs. If
//! the `CREATE` fails, the catalog is consulted again: a table that now
//! exists (another process won the race) counts as success.

use sqlx::AnyConnection;
use tracing::{debug, info};

use crate::domain::backend::BackendKind;
use crate::domain::schema::{BootstrapSummary, Schema, TableSpec};
use crate::error::{Error, Result};
use crate::infrastructure::database::connection::{table_exists_sql, StoreConnection};

/// Apply `schema` on a blocking connection.
///
/// # Errors
///
/// Returns [`Error::Bootstrap`] for a table that could not be created and
/// does not exist afterwards, or a query error if the catalog lookup fails.
pub fn apply_blocking(conn: &mut StoreConnection, schema: &Schema) -> Result<BootstrapSummary> {
    let mut summary = BootstrapSummary::default();
    for table in schema.tables() {
        if conn.table_exists(&table.name)? {
            summary.record(table, false);
            continue;
        }
        match conn.batch_execute(&table.ddl) {
            Ok(()) => summary.record(table, true),
            Err(e) => {
                if !conn.table_exists(&table.name).unwrap_or(false) {
                    return Err(bootstrap_error(table, &e));
                }
                debug!(table = %table.name, "Table appeared concurrently");
                summary.record(table, false);
            }
        }
    }
    log_summary(&summary);
    Ok(summary)
}

/// Apply `schema` on a non-blocking connection.
///
/// # Errors
///
/// Same as [`apply_blocking`].
pub async fn apply_async(
    conn: &mut AnyConnection,
    kind: BackendKind,
    schema: &Schema,
) -> Result<BootstrapSummary> {
    let mut summary = BootstrapSummary::default();
    for table in schema.tables() {
        if table_exists_async(conn, kind, &table.name).await? {
            summary.record(table, false);
            continue;
        }
        match sqlx::query(&table.ddl).execute(&mut *conn).await {
            Ok(_) => summary.record(table, true),
            Err(e) => {
                if !table_exists_async(conn, kind, &table.name)
                    .await
                    .unwrap_or(false)
                {
                    return Err(bootstrap_error(table, &e));
                }
                debug!(table = %table.name, "Table appeared concurrently");
                summary.record(table, false);
            }
        }
    }
    log_summary(&summary);
    Ok(summary)
}

async fn table_exists_async(conn: &mut AnyConnection, kind: BackendKind, table: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(table_exists_sql(kind))
        .bind(table)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

fn bootstrap_error(table: &TableSpec, e: &dyn std::fmt::Display) -> Error {
    Error::Bootstrap {
        table: table.name.clone(),
        reason: e.to_string(),
    }
}

fn log_summary(summary: &BootstrapSummary) {
    info!(
        created = summary.created.len(),
        existing = summary.existing.len(),
        "Database tables ready"
    );
}
