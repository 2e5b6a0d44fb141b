// crates/stockrx-ops/src/db/migration_helpers.rs
// Schema introspection and idempotent migration helpers

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Check if a table exists in the database
pub fn table_exists(conn: &Connection, table_name: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?",
        [table_name],
        |_| Ok(true),
    )
    .unwrap_or(false)
}

/// Check if a column exists in a table
pub fn column_exists(conn: &Connection, table_name: &str, column_name: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM pragma_table_info(?) WHERE name=?",
        [table_name, column_name],
        |_| Ok(true),
    )
    .unwrap_or(false)
}

/// Add a column to a table if it doesn't already exist
pub fn add_column_if_missing(
    conn: &Connection,
    table_name: &str,
    column_name: &str,
    column_def: &str,
) -> Result<()> {
    if column_exists(conn, table_name, column_name) {
        return Ok(());
    }

    info!("Migrating {} to add {} column", table_name, column_name);
    let sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        table_name, column_name, column_def
    );
    conn.execute(&sql, [])?;
    Ok(())
}

/// Create a table if it doesn't exist (with logging)
pub fn create_table_if_missing(conn: &Connection, table_name: &str, sql: &str) -> Result<()> {
    if table_exists(conn, table_name) {
        return Ok(());
    }

    info!("Creating {} table", table_name);
    conn.execute_batch(sql)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_exists_in_memory() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!table_exists(&conn, "stores"));

        conn.execute("CREATE TABLE stores (id INTEGER)", [])
            .unwrap();
        assert!(table_exists(&conn, "stores"));
    }

    #[test]
    fn test_column_exists_in_memory() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE inventories (id INTEGER, name TEXT)", [])
            .unwrap();

        assert!(column_exists(&conn, "inventories", "name"));
        assert!(!column_exists(&conn, "inventories", "batches_count"));
        assert!(!column_exists(&conn, "missing_table", "id"));
    }

    #[test]
    fn test_add_column_if_missing_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE inventories (id INTEGER PRIMARY KEY)", [])
            .unwrap();

        add_column_if_missing(&conn, "inventories", "batches_count", "INTEGER DEFAULT 0").unwrap();
        add_column_if_missing(&conn, "inventories", "batches_count", "INTEGER DEFAULT 0").unwrap();

        assert!(column_exists(&conn, "inventories", "batches_count"));
    }

    #[test]
    fn test_create_table_if_missing() {
        let conn = Connection::open_in_memory().unwrap();
        let sql = "CREATE TABLE patch_locks (patch_name TEXT PRIMARY KEY);";

        create_table_if_missing(&conn, "patch_locks", sql).unwrap();
        // Second call must not fail even though the SQL has no IF NOT EXISTS
        create_table_if_missing(&conn, "patch_locks", sql).unwrap();

        assert!(table_exists(&conn, "patch_locks"));
    }
}
