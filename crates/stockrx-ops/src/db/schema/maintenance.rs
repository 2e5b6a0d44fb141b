// crates/stockrx-ops/src/db/schema/maintenance.rs
// Tables owned by the maintenance toolkit itself

use crate::db::migration_helpers::create_table_if_missing;
use anyhow::Result;
use rusqlite::Connection;

/// Audit log of data patch runs
pub fn migrate_patch_executions_table(conn: &Connection) -> Result<()> {
    create_table_if_missing(
        conn,
        "patch_executions",
        r#"
        CREATE TABLE IF NOT EXISTS patch_executions (
            id INTEGER PRIMARY KEY,
            patch_name TEXT NOT NULL,
            options_json TEXT NOT NULL DEFAULT '{}',
            dry_run INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'running',
            target_count INTEGER,
            processed INTEGER NOT NULL DEFAULT 0,
            succeeded INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            started_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            finished_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_patch_executions_name
            ON patch_executions(patch_name, started_at DESC);
        CREATE INDEX IF NOT EXISTS idx_patch_executions_status ON patch_executions(status);
    "#,
    )
}

/// Per-patch advisory locks (one row per running patch)
pub fn migrate_patch_locks_table(conn: &Connection) -> Result<()> {
    create_table_if_missing(
        conn,
        "patch_locks",
        r#"
        CREATE TABLE IF NOT EXISTS patch_locks (
            patch_name TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            acquired_at TEXT NOT NULL
        );
    "#,
    )
}
