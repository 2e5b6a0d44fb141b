// crates/stockrx-ops/src/db/savepoint.rs
// Named savepoints over a shared `&Connection`
//
// Pooled connections are handed out as `&Connection`, so rusqlite's
// `Savepoint` (which needs `&mut`) is unavailable. Raw SAVEPOINT statements
// nest correctly both inside and outside an open transaction.

use crate::error::{Result, StockrxError};
use rusqlite::Connection;

/// Run `f` inside `SAVEPOINT name`. On error everything `f` wrote is rolled
/// back and the error is returned; the enclosing transaction (if any) stays
/// usable.
pub fn with_savepoint<T>(
    conn: &Connection,
    name: &str,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name}"))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) =
                conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
            {
                tracing::warn!(
                    savepoint = name,
                    error = %rollback_err,
                    "Savepoint rollback failed"
                );
                return Err(StockrxError::Db(rollback_err));
            }
            Err(e)
        }
    }
}
