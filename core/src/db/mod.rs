//! SQLite persistence.
//!
//! This module provides:
//! - Connection pooling (r2d2-sqlite) with WAL and foreign key pragmas
//! - Forward-only schema migrations tracked by `PRAGMA user_version`
//! - `with_connection` to run blocking SQLite work off the async runtime
//! - Transaction helpers with automatic rollback
//! - The [`Store`] repository used by the pipelines and the chat relay

pub mod async_wrapper;
pub mod connection;
pub mod migrations;
pub mod store;
pub mod transactions;

pub use async_wrapper::with_connection;
pub use connection::initialize_pool;
pub use store::Store;
pub use transactions::execute_in_transaction;

/// Database module result type
pub type Result<T> = std::result::Result<T, DbError>;

/// Database error types
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
