//! Async bridge for the synchronous SQLite API.
//!
//! Each call checks a connection out of the pool and runs the closure on
//! tokio's blocking thread pool so request handlers never stall the runtime.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use super::{DbError, Result};

/// Execute a sync database operation from async code using `spawn_blocking`.
pub async fn with_connection<F, T>(pool: &Pool<SqliteConnectionManager>, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();

    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DbError::Pool(format!("Failed to get connection: {e}")))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| DbError::Transaction(format!("Task join error: {e}")))?
}
