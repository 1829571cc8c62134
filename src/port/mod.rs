//! Ports between the inbound adapters and the database infrastructure.

pub mod inbound;
