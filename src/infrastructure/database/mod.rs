//! Database connection lifecycle.
//!
//! # Submodules
//!
//! - [`profile`] - Settings to immutable connection descriptor
//! - [`connection`] - Physical connections and the r2d2 manager
//! - [`instrument`] - Connect, checkout and checkin hooks
//! - [`pool`] - Blocking and non-blocking pool factory
//! - [`keepalive`] - Background keep-alive scheduler
//! - [`session`] - Scoped transactional sessions
//! - [`schema`] - Idempotent table bootstrap
//! - [`manager`] - The [`DatabaseManager`] tying it together
//! - [`operator`] - [`DatabaseManager`] behind the inbound operator port

pub mod connection;
pub mod instrument;
pub mod keepalive;
pub mod manager;
pub mod operator;
pub mod pool;
pub mod profile;
pub mod schema;
pub mod session;

pub use crate::domain::backend::BackendKind;
pub use crate::domain::health::{
    ConnectionTest, HealthReport, HealthStatus, PoolOccupancy, PoolStatus, ProbeOutcome,
};
pub use crate::domain::schema::{BootstrapSummary, Schema, TableSpec};
pub use manager::DatabaseManager;
pub use profile::ConnectionDescriptor;
