// db/test_support.rs
// Shared test helpers for database tests

use super::pool::DatabasePool;
use super::schema::run_all_migrations;
use rusqlite::{Connection, params};
use std::sync::Arc;

/// Plain in-memory connection with the full schema (for sync tests)
pub fn setup_test_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to open in-memory db");
    conn.execute_batch("PRAGMA foreign_keys=ON;")
        .expect("Failed to enable foreign keys");
    run_all_migrations(&conn).expect("Failed to run migrations");
    conn
}

/// Create a test pool (in-memory DB, shared cache)
pub async fn setup_test_pool() -> Arc<DatabasePool> {
    Arc::new(
        DatabasePool::open_in_memory()
            .await
            .expect("Failed to open in-memory pool"),
    )
}

pub fn insert_store(conn: &Connection, code: &str) -> i64 {
    conn.execute(
        "INSERT INTO stores (name, code) VALUES (?, ?)",
        params![format!("Store {code}"), code],
    )
    .expect("Failed to insert store");
    conn.last_insert_rowid()
}

pub fn insert_inventory(conn: &Connection, name: &str, category: Option<&str>, price: i64) -> i64 {
    conn.execute(
        "INSERT INTO inventories (name, category, price) VALUES (?, ?, ?)",
        params![name, category, price],
    )
    .expect("Failed to insert inventory");
    conn.last_insert_rowid()
}

pub fn insert_batch(conn: &Connection, inventory_id: i64, expires_on: &str, status: &str) -> i64 {
    conn.execute(
        "INSERT INTO batches (inventory_id, lot_code, quantity, expires_on, status)
         VALUES (?, ?, 10, ?, ?)",
        params![
            inventory_id,
            format!("LOT-{inventory_id}-{expires_on}"),
            expires_on,
            status
        ],
    )
    .expect("Failed to insert batch");
    conn.last_insert_rowid()
}

/// Insert `n` child rows into a table keyed by `inventory_id` without
/// touching the parent's counter cache (simulates a bulk import).
pub fn insert_inventory_children(conn: &Connection, table: &str, inventory_id: i64, n: usize) {
    let sql = match table {
        "batches" => "INSERT INTO batches (inventory_id, lot_code) VALUES (?, 'LOT')",
        "inventory_logs" => "INSERT INTO inventory_logs (inventory_id) VALUES (?)",
        "shipments" => "INSERT INTO shipments (inventory_id) VALUES (?)",
        "receipts" => "INSERT INTO receipts (inventory_id) VALUES (?)",
        other => panic!("unsupported child table {other}"),
    };
    for _ in 0..n {
        conn.execute(sql, [inventory_id])
            .expect("Failed to insert child row");
    }
}

pub fn insert_transfer(
    conn: &Connection,
    source: i64,
    destination: i64,
    inventory_id: i64,
    status: &str,
) {
    conn.execute(
        "INSERT INTO inter_store_transfers
             (source_store_id, destination_store_id, inventory_id, quantity, status)
         VALUES (?, ?, ?, 1, ?)",
        params![source, destination, inventory_id, status],
    )
    .expect("Failed to insert transfer");
}

pub fn inventory_price(conn: &Connection, id: i64) -> i64 {
    conn.query_row("SELECT price FROM inventories WHERE id = ?", [id], |r| {
        r.get(0)
    })
    .expect("Failed to read price")
}
