//! Handler for the `serve` command.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::adapter::inbound::cli::init;
use crate::adapter::inbound::http;
use crate::error::Result;
use crate::port::inbound::operator::DatabaseOperator;

/// Bootstrap the built-in tables and serve the ops endpoints until Ctrl-C.
pub async fn execute(operator: Arc<dyn DatabaseOperator>, addr: SocketAddr) -> Result<()> {
    let summary = operator.bootstrap(&init::builtin_schema()).await?;
    info!(
        created = summary.created.len(),
        existing = summary.existing.len(),
        "Schema ready"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Ops endpoints listening");

    axum::serve(listener, http::router(operator))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        return;
    }
    info!("Shutdown signal received");
}
