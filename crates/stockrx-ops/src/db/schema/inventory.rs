// crates/stockrx-ops/src/db/schema/inventory.rs
// Counter cache column migrations for parent tables

use crate::db::migration_helpers::{add_column_if_missing, table_exists};
use anyhow::Result;
use rusqlite::Connection;

/// Add counter cache columns to `inventories` when the table predates them.
pub fn migrate_inventory_counter_columns(conn: &Connection) -> Result<()> {
    if !table_exists(conn, "inventories") {
        return Ok(());
    }

    for column in [
        "batches_count",
        "inventory_logs_count",
        "shipments_count",
        "receipts_count",
    ] {
        add_column_if_missing(conn, "inventories", column, "INTEGER DEFAULT 0")?;
    }
    Ok(())
}

/// Add counter cache columns to `stores` when the table predates them.
pub fn migrate_store_counter_columns(conn: &Connection) -> Result<()> {
    if !table_exists(conn, "stores") {
        return Ok(());
    }

    for column in [
        "store_inventories_count",
        "pending_outgoing_transfers_count",
        "pending_incoming_transfers_count",
    ] {
        add_column_if_missing(conn, "stores", column, "INTEGER DEFAULT 0")?;
    }
    Ok(())
}
