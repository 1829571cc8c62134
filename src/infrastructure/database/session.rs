//! Scoped session acquisition.
//!
//! A session is a closure run against one pooled connection inside a
//! transaction: committed when the closure returns `Ok`, rolled back when it
//! returns `Err`. The connection goes back to its pool on every exit path.
//! A panic inside the closure leaves the transaction open, so the blocking
//! pool discards that connection instead of reusing it.

use futures_util::future::BoxFuture;
use sqlx::AnyConnection;
use tracing::warn;

use crate::error::Result;
use crate::infrastructure::database::connection::StoreConnection;
use crate::infrastructure::database::pool::{AsyncPool, BlockingPool, ASYNC_POOL, BLOCKING_POOL};

/// Run `f` in a transaction on a connection from the blocking pool.
///
/// # Errors
///
/// Returns [`crate::error::Error::PoolExhausted`] if no connection is
/// available in time, a query error if `BEGIN` or `COMMIT` fails, or
/// whatever `f` returned.
pub fn run_blocking<T, F>(pool: &BlockingPool, f: F) -> Result<T>
where
    F: FnOnce(&mut StoreConnection) -> Result<T>,
{
    let mut conn = pool.checkout()?;
    conn.begin()?;

    match f(&mut *conn) {
        Ok(value) => {
            conn.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.rollback() {
                warn!(pool = BLOCKING_POOL, error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Run `f` in a transaction on a connection from the non-blocking pool.
///
/// If the returned future is dropped before completion the transaction is
/// rolled back when the connection returns to the pool.
///
/// # Errors
///
/// Returns [`crate::error::Error::PoolExhausted`] or
/// [`crate::error::Error::PoolClosed`] from acquisition, a query error if
/// `BEGIN` or `COMMIT` fails, or whatever `f` returned.
pub async fn run_async<T, F>(pool: &AsyncPool, f: F) -> Result<T>
where
    F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, Result<T>>,
{
    let mut tx = pool.begin().await?;

    match f(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(pool = ASYNC_POOL, error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}
