//! Connection pooling and pragma configuration

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use super::{DbError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
/// Negative values are KiB: 32 MB.
const CACHE_SIZE_KIB: i64 = -32_000;

/// Open a pool of connections to the database at `db_path`.
///
/// Every pooled connection gets WAL journaling, foreign key enforcement and a
/// busy timeout. The parent directory is created when missing.
pub fn initialize_pool(db_path: &Path, pool_size: u32) -> Result<Pool<SqliteConnectionManager>> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            DbError::Pool(format!(
                "Failed to create database directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(apply_pragmas);
    let pool = Pool::builder()
        .max_size(pool_size.max(1))
        .build(manager)
        .map_err(|e| DbError::Pool(format!("Failed to build pool: {e}")))?;

    let conn = pool
        .get()
        .map_err(|e| DbError::Pool(format!("Failed to get connection: {e}")))?;
    verify_pragmas(&conn)?;

    tracing::debug!(path = %db_path.display(), pool_size, "Database pool ready");
    Ok(pool)
}

fn apply_pragmas(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", CACHE_SIZE_KIB)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

fn verify_pragmas(conn: &Connection) -> Result<()> {
    let foreign_keys: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    if foreign_keys != 1 {
        return Err(DbError::Pool("foreign keys are not enforced".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pragmas_applied_to_pooled_connections() {
        let temp_dir = TempDir::new().expect("temp dir");
        let pool = initialize_pool(&temp_dir.path().join("nested").join("test.db"), 2)
            .expect("pool creation");
        assert_eq!(pool.max_size(), 2);

        let conn = pool.get().expect("connection");
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("journal mode");
        assert_eq!(journal_mode, "wal");

        let busy_timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .expect("busy timeout");
        assert_eq!(busy_timeout, 5000);

        let cache_size: i64 = conn
            .query_row("PRAGMA cache_size", [], |row| row.get(0))
            .expect("cache size");
        assert_eq!(cache_size, CACHE_SIZE_KIB);
    }
}
