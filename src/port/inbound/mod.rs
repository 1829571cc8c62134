//! Inbound (driving) ports consumed by the CLI and the ops endpoints.
//!
//! - [`operator`]: Store operations exposed to operators

pub mod operator;
