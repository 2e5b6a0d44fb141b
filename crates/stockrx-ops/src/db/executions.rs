// crates/stockrx-ops/src/db/executions.rs
// Patch execution audit log CRUD operations

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

/// One row of `patch_executions`
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub patch_name: String,
    pub options_json: String,
    pub dry_run: bool,
    pub status: String,
    pub target_count: Option<i64>,
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// Final figures written when a run ends.
#[derive(Debug, Clone)]
pub struct ExecutionSummary<'a> {
    pub status: &'a str,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub error: Option<&'a str>,
}

const EXECUTION_COLUMNS: &str = "id, patch_name, options_json, dry_run, status, target_count, \
     processed, succeeded, failed, error, started_at, finished_at";

fn parse_execution_row(row: &Row) -> rusqlite::Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        id: row.get(0)?,
        patch_name: row.get(1)?,
        options_json: row.get(2)?,
        dry_run: row.get::<_, i64>(3)? != 0,
        status: row.get(4)?,
        target_count: row.get(5)?,
        processed: row.get(6)?,
        succeeded: row.get(7)?,
        failed: row.get(8)?,
        error: row.get(9)?,
        started_at: row.get(10)?,
        finished_at: row.get(11)?,
    })
}

/// Record the start of a run. Returns the execution id.
pub fn start_execution_sync(
    conn: &Connection,
    patch_name: &str,
    options_json: &str,
    dry_run: bool,
    target_count: u64,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO patch_executions
             (patch_name, options_json, dry_run, status, target_count, started_at)
         VALUES (?, ?, ?, 'running', ?, datetime('now'))",
        params![patch_name, options_json, dry_run as i64, target_count as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Record the outcome of a run.
pub fn finish_execution_sync(
    conn: &Connection,
    id: i64,
    summary: &ExecutionSummary<'_>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE patch_executions
         SET status = ?, processed = ?, succeeded = ?, failed = ?, error = ?,
             finished_at = datetime('now')
         WHERE id = ?",
        params![
            summary.status,
            summary.processed as i64,
            summary.succeeded as i64,
            summary.failed as i64,
            summary.error,
            id
        ],
    )?;
    Ok(())
}

/// Most recent runs first.
pub fn recent_executions_sync(
    conn: &Connection,
    patch_name: Option<&str>,
    limit: usize,
) -> rusqlite::Result<Vec<ExecutionRecord>> {
    let sql = format!(
        "SELECT {EXECUTION_COLUMNS} FROM patch_executions
         WHERE (?1 IS NULL OR patch_name = ?1)
         ORDER BY id DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patch_name, limit as i64], parse_execution_row)?;
    rows.collect()
}

pub fn get_execution_sync(conn: &Connection, id: i64) -> rusqlite::Result<Option<ExecutionRecord>> {
    let sql = format!("SELECT {EXECUTION_COLUMNS} FROM patch_executions WHERE id = ?");
    conn.query_row(&sql, [id], parse_execution_row).optional()
}

/// Run counts grouped by status, ordered by status name.
pub fn execution_counts_by_status_sync(conn: &Connection) -> rusqlite::Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM patch_executions GROUP BY status ORDER BY status",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}
