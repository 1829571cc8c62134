//! Plain value types shared by the ports and the infrastructure.
//!
//! - [`backend`]: Backend kinds
//! - [`health`]: Pool snapshots, probe outcomes and health reports
//! - [`schema`]: Tables handed to the bootstrap

pub mod backend;
pub mod health;
pub mod schema;
