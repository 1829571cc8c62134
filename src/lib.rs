//! Poolkeeper - connection lifecycle manager for relational stores.
//!
//! Configures, pools, instruments, health-checks and keeps alive the
//! connections a service uses to reach its store, under two deployment
//! profiles: an embedded single-file store (SQLite) and a networked
//! multi-client store (MySQL, behind the `mysql` feature).
//!
//! # Modules
//!
//! - [`domain`] - Backend kinds, health reports and schema definitions
//! - [`port::inbound::operator`] - Operator surface used by the CLI and HTTP
//!   adapters
//! - [`infrastructure::config`] - TOML and environment configuration
//! - [`infrastructure::database`] - Pools, keep-alive, sessions and health
//! - [`adapter::inbound::http`] - Ops endpoints (`/health`, `/pool-status`,
//!   `/test-connection`)
//! - [`adapter::inbound::cli`] - Command handlers for the `poolkeeper` binary
//! - [`error`] - Error types for the crate
//!
//! # Features
//!
//! - `mysql` - Enable the networked backend (links libmysqlclient)
//!
//! # Example
//!
//! ```no_run
//! use poolkeeper::infrastructure::config::database::DatabaseSettings;
//! use poolkeeper::infrastructure::database::{ConnectionDescriptor, DatabaseManager};
//!
//! # async fn run() -> poolkeeper::error::Result<()> {
//! let descriptor = ConnectionDescriptor::resolve(&DatabaseSettings::default())?;
//! let manager = DatabaseManager::start(descriptor).await?;
//!
//! let rows = manager.acquire_session(|conn| {
//!     Ok(conn.execute("UPDATE service_heartbeat SET checked_at = CURRENT_TIMESTAMP")?)
//! })?;
//! println!("touched {rows} rows");
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cli;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;
