// crates/stockrx-ops/src/db/schema/mod.rs
// Database schema and migrations

use anyhow::Result;
use rusqlite::Connection;

mod inventory;
mod maintenance;

/// Run all schema setup and migrations.
///
/// Idempotent: tables are created with IF NOT EXISTS and later columns are
/// only added when missing, so this runs on every pool open.
pub fn run_all_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    // Databases created before counter caches existed on every parent table
    inventory::migrate_inventory_counter_columns(conn)?;
    inventory::migrate_store_counter_columns(conn)?;

    maintenance::migrate_patch_executions_table(conn)?;
    maintenance::migrate_patch_locks_table(conn)?;

    Ok(())
}

/// Core StockRx tables touched by reconciliation and data patches.
///
/// Counter columns are nullable on purpose: rows written by bulk imports
/// can carry NULL, which reconciliation reads as 0.
pub const SCHEMA: &str = r#"
-- =======================================
-- Stores
-- =======================================
CREATE TABLE IF NOT EXISTS stores (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    code TEXT NOT NULL UNIQUE,
    store_inventories_count INTEGER DEFAULT 0,
    pending_outgoing_transfers_count INTEGER DEFAULT 0,
    pending_incoming_transfers_count INTEGER DEFAULT 0,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);

-- =======================================
-- Inventories
-- =======================================
CREATE TABLE IF NOT EXISTS inventories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT,
    price INTEGER NOT NULL DEFAULT 0 CHECK (price >= 0),
    quantity INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    batches_count INTEGER DEFAULT 0,
    inventory_logs_count INTEGER DEFAULT 0,
    shipments_count INTEGER DEFAULT 0,
    receipts_count INTEGER DEFAULT 0,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_inventories_category ON inventories(category);
CREATE INDEX IF NOT EXISTS idx_inventories_price ON inventories(price);

CREATE TABLE IF NOT EXISTS batches (
    id INTEGER PRIMARY KEY,
    inventory_id INTEGER NOT NULL REFERENCES inventories(id) ON DELETE CASCADE,
    lot_code TEXT NOT NULL,
    quantity INTEGER NOT NULL DEFAULT 0,
    expires_on TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_batches_inventory ON batches(inventory_id);
CREATE INDEX IF NOT EXISTS idx_batches_expires ON batches(expires_on);

CREATE TABLE IF NOT EXISTS inventory_logs (
    id INTEGER PRIMARY KEY,
    inventory_id INTEGER NOT NULL REFERENCES inventories(id) ON DELETE CASCADE,
    delta INTEGER NOT NULL DEFAULT 0,
    operation_type TEXT NOT NULL DEFAULT 'adjust',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_inventory_logs_inventory ON inventory_logs(inventory_id);

CREATE TABLE IF NOT EXISTS shipments (
    id INTEGER PRIMARY KEY,
    inventory_id INTEGER NOT NULL REFERENCES inventories(id) ON DELETE CASCADE,
    quantity INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_shipments_inventory ON shipments(inventory_id);

CREATE TABLE IF NOT EXISTS receipts (
    id INTEGER PRIMARY KEY,
    inventory_id INTEGER NOT NULL REFERENCES inventories(id) ON DELETE CASCADE,
    quantity INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_receipts_inventory ON receipts(inventory_id);

-- =======================================
-- Multi-store stock
-- =======================================
CREATE TABLE IF NOT EXISTS store_inventories (
    id INTEGER PRIMARY KEY,
    store_id INTEGER NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
    inventory_id INTEGER NOT NULL REFERENCES inventories(id) ON DELETE CASCADE,
    quantity INTEGER NOT NULL DEFAULT 0,
    UNIQUE(store_id, inventory_id)
);
CREATE INDEX IF NOT EXISTS idx_store_inventories_store ON store_inventories(store_id);

CREATE TABLE IF NOT EXISTS inter_store_transfers (
    id INTEGER PRIMARY KEY,
    source_store_id INTEGER NOT NULL REFERENCES stores(id),
    destination_store_id INTEGER NOT NULL REFERENCES stores(id),
    inventory_id INTEGER NOT NULL REFERENCES inventories(id),
    quantity INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_transfers_source ON inter_store_transfers(source_store_id, status);
CREATE INDEX IF NOT EXISTS idx_transfers_destination
    ON inter_store_transfers(destination_store_id, status);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migration_helpers::{column_exists, table_exists};

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn).unwrap();
        run_all_migrations(&conn).unwrap();

        for table in [
            "stores",
            "inventories",
            "batches",
            "inventory_logs",
            "shipments",
            "receipts",
            "store_inventories",
            "inter_store_transfers",
            "patch_executions",
            "patch_locks",
        ] {
            assert!(table_exists(&conn, table), "missing table {}", table);
        }
    }

    #[test]
    fn test_price_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO inventories (name, price) VALUES ('bad', -1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_legacy_inventories_table_gains_counters() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE inventories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT,
                price INTEGER NOT NULL DEFAULT 0,
                quantity INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'active',
                updated_at TEXT
            );",
        )
        .unwrap();

        run_all_migrations(&conn).unwrap();

        assert!(column_exists(&conn, "inventories", "batches_count"));
        assert!(column_exists(&conn, "inventories", "receipts_count"));
    }
}
