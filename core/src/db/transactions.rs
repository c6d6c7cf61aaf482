//! Transaction helpers

use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::Result;

/// Run `operation` inside a transaction.
///
/// Commits when the closure returns `Ok`; on `Err` the transaction is dropped
/// and SQLite rolls it back.
///
/// # Example
/// ```rust,no_run
/// # use mindcraft_core::db::transactions::execute_in_transaction;
/// # use rusqlite::{Connection, TransactionBehavior};
/// # fn example(conn: &mut Connection) -> mindcraft_core::db::Result<()> {
/// execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
///     tx.execute("INSERT INTO subjects (name) VALUES (?1)", ["Science"])?;
///     Ok(())
/// })?;
/// # Ok(())
/// # }
/// ```
pub fn execute_in_transaction<F, T>(
    conn: &mut Connection,
    behavior: TransactionBehavior,
    operation: F,
) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(behavior)?;
    let result = operation(&tx)?;
    tx.commit()?;
    Ok(result)
}
