//! Adapters exposing the manager to the outside world.

pub mod inbound;
