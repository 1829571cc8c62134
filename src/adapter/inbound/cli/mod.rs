//! CLI command handlers.
//!
//! Handlers reach the store only through
//! [`DatabaseOperator`](crate::port::inbound::operator::DatabaseOperator).

pub mod check;
pub mod init;
pub mod output;
pub mod pool_status;
pub mod serve;
