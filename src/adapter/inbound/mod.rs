//! Inbound adapters: the command line and the ops HTTP endpoints.

pub mod cli;
pub mod http;
