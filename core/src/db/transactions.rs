//! Transaction helper with automatic rollback

use crate::errors::{IntakeError, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Execute `operation` within a transaction.
///
/// Commits when the closure returns `Ok`. On `Err` the transaction is
/// dropped without commit, which rolls it back.
///
/// Use `Immediate` for writes: the write lock is taken up front, so two
/// writers never interleave and the second waits (up to `busy_timeout`)
/// for the first to finish. Use `Deferred` for read snapshots.
pub fn execute_in_transaction<F, T>(
    conn: &mut Connection,
    behavior: TransactionBehavior,
    operation: F,
) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn
        .transaction_with_behavior(behavior)
        .map_err(|e| IntakeError::storage_with_source("failed to begin transaction", e))?;

    match operation(&tx) {
        Ok(result) => {
            tx.commit()
                .map_err(|e| IntakeError::storage_with_source("failed to commit transaction", e))?;
            Ok(result)
        }
        Err(e) => {
            // Rollback happens via Drop
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE test_data (id INTEGER PRIMARY KEY, value INTEGER NOT NULL)",
            [],
        )
        .expect("create");
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM test_data", [], |row| row.get(0))
            .expect("count")
    }

    #[test]
    fn test_transaction_commit() {
        let mut conn = setup_test_db();

        let result = execute_in_transaction(&mut conn, TransactionBehavior::Immediate, |tx| {
            tx.execute("INSERT INTO test_data (value) VALUES (?1)", [42])
                .map_err(|e| IntakeError::storage_with_source("insert", e))?;
            Ok(())
        });

        assert!(result.is_ok(), "Transaction should commit successfully");
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_transaction_rollback_is_all_or_nothing() {
        let mut conn = setup_test_db();

        let result: Result<()> =
            execute_in_transaction(&mut conn, TransactionBehavior::Immediate, |tx| {
                tx.execute("INSERT INTO test_data (value) VALUES (?1)", [10])
                    .map_err(|e| IntakeError::storage_with_source("insert", e))?;
                tx.execute("INSERT INTO test_data (value) VALUES (?1)", [20])
                    .map_err(|e| IntakeError::storage_with_source("insert", e))?;
                Err(IntakeError::conflict("simulated failure"))
            });

        assert!(result.is_err(), "Transaction should fail");
        assert_eq!(count(&conn), 0, "Rolled back rows must not persist");
    }

    #[test]
    fn test_error_kind_passes_through() {
        let mut conn = setup_test_db();
        let err = execute_in_transaction::<_, ()>(&mut conn, TransactionBehavior::Deferred, |_| {
            Err(IntakeError::session_not_found("session_x"))
        })
        .expect_err("should fail");
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }
}
