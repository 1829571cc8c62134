//! Infrastructure layer.
//!
//! Provides technical concerns that support the host service without
//! containing business logic.
//!
//! # Submodules
//!
//! - [`config`] - Configuration loading and validation
//! - [`database`] - Connection pooling, keep-alive, sessions and health

pub mod config;
pub mod database;
