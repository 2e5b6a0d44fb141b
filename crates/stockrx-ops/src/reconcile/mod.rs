// crates/stockrx-ops/src/reconcile/mod.rs
// Counter cache reconciliation: verify and repair cached aggregate counts
//
// Every call recomputes from the live store; nothing is cached between
// invocations. Repairs use a single correlated UPDATE per counter so a child
// inserted mid-repair is either counted or left as ordinary drift for the
// next scan.

mod counters;
mod scan;

pub use counters::{CounterDefinition, EntityKind};
pub use scan::{AggregateReport, EntityFailure, Offender, ScanOptions, bulk_scan};

use crate::db::migration_helpers::column_exists;
use crate::db::with_savepoint;
use crate::error::{Result, StockrxError};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

/// Cached vs. actual value of one counter on one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterStatus {
    pub counter: &'static str,
    pub cached: i64,
    pub actual: i64,
    /// False when the counter column is missing from the parent table
    pub column_present: bool,
}

impl CounterStatus {
    pub fn is_consistent(&self) -> bool {
        self.cached == self.actual
    }
}

/// A counter whose cached value disagrees with the live count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub kind: EntityKind,
    pub entity_id: i64,
    pub counter: &'static str,
    pub cached: i64,
    pub actual: i64,
}

impl Discrepancy {
    /// Signed drift: positive when the cache under-counts.
    pub fn difference(&self) -> i64 {
        self.actual - self.cached
    }
}

fn ensure_entity_exists(conn: &Connection, kind: EntityKind, id: i64) -> Result<()> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", kind.table());
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(StockrxError::EntityNotFound {
            kind: kind.as_str().to_string(),
            id,
        }),
    }
}

fn cached_value(
    conn: &Connection,
    kind: EntityKind,
    def: &CounterDefinition,
    id: i64,
) -> Result<Option<i64>> {
    if !column_exists(conn, kind.table(), def.column) {
        return Ok(None);
    }
    let sql = format!(
        "SELECT COALESCE({}, 0) FROM {} WHERE id = ?",
        def.column,
        kind.table()
    );
    Ok(Some(conn.query_row(&sql, [id], |r| r.get(0))?))
}

fn actual_value(conn: &Connection, def: &CounterDefinition, id: i64) -> Result<i64> {
    Ok(conn.query_row(&def.count_sql(), [id], |r| r.get(0))?)
}

/// Full per-counter report for one entity. Missing or NULL counter columns read as 0.
pub fn counter_statuses(
    conn: &Connection,
    kind: EntityKind,
    id: i64,
) -> Result<Vec<CounterStatus>> {
    ensure_entity_exists(conn, kind, id)?;

    kind.counters()
        .iter()
        .map(|def| {
            let cached = cached_value(conn, kind, def, id)?;
            Ok(CounterStatus {
                counter: def.column,
                cached: cached.unwrap_or(0),
                actual: actual_value(conn, def, id)?,
                column_present: cached.is_some(),
            })
        })
        .collect()
}

/// Inconsistent counters on one entity. Empty when everything matches. Read-only.
pub fn check_integrity(conn: &Connection, kind: EntityKind, id: i64) -> Result<Vec<Discrepancy>> {
    let discrepancies: Vec<Discrepancy> = counter_statuses(conn, kind, id)?
        .into_iter()
        .filter(|status| !status.is_consistent())
        .map(|status| Discrepancy {
            kind,
            entity_id: id,
            counter: status.counter,
            cached: status.cached,
            actual: status.actual,
        })
        .collect();

    if !discrepancies.is_empty() {
        debug!(
            kind = kind.as_str(),
            id,
            count = discrepancies.len(),
            "Counter discrepancies found"
        );
    }
    Ok(discrepancies)
}

/// Resync every inconsistent counter on one entity from a live count.
///
/// Returns the discrepancies that were repaired. All repairs for the entity
/// apply together or not at all.
pub fn fix_integrity(conn: &Connection, kind: EntityKind, id: i64) -> Result<Vec<Discrepancy>> {
    let discrepancies = check_integrity(conn, kind, id)?;
    if discrepancies.is_empty() {
        return Ok(discrepancies);
    }

    with_savepoint(conn, "fix_counters", |conn| {
        for discrepancy in &discrepancies {
            let def = kind
                .counters()
                .iter()
                .find(|d| d.column == discrepancy.counter)
                .ok_or_else(|| {
                    StockrxError::Other(format!("unknown counter {}", discrepancy.counter))
                })?;

            if !column_exists(conn, kind.table(), def.column) {
                return Err(StockrxError::MissingCounterColumn {
                    table: kind.table().to_string(),
                    column: def.column.to_string(),
                });
            }
            conn.execute(&def.resync_sql(kind.table()), [id])?;
        }
        Ok(())
    })?;

    info!(
        kind = kind.as_str(),
        id,
        repaired = discrepancies.len(),
        "Counter caches resynchronized"
    );
    Ok(discrepancies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    fn drift(conn: &Connection, kind: EntityKind, id: i64) -> usize {
        check_integrity(conn, kind, id).unwrap().len()
    }

    fn batches_count(conn: &Connection, id: i64) -> i64 {
        let sql = "SELECT batches_count FROM inventories WHERE id = ?";
        conn.query_row(sql, [id], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_consistent_entity_has_no_discrepancies() {
        let conn = setup_test_conn();
        let id = insert_inventory(&conn, "Aspirin", Some("medicine"), 500);
        assert_eq!(drift(&conn, EntityKind::Inventory, id), 0);
    }

    #[test]
    fn test_bulk_insert_drift_is_detected() {
        let conn = setup_test_conn();
        let id = insert_inventory(&conn, "Aspirin", Some("medicine"), 500);
        insert_inventory_children(&conn, "batches", id, 3);
        insert_inventory_children(&conn, "shipments", id, 1);

        let found = check_integrity(&conn, EntityKind::Inventory, id).unwrap();
        assert_eq!(found.len(), 2);
        let batches = found.iter().find(|d| d.counter == "batches_count").unwrap();
        assert_eq!(batches.cached, 0);
        assert_eq!(batches.actual, 3);
        assert_eq!(batches.difference(), 3);
    }

    #[test]
    fn test_check_is_read_only() {
        let conn = setup_test_conn();
        let id = insert_inventory(&conn, "Aspirin", None, 500);
        insert_inventory_children(&conn, "batches", id, 2);

        check_integrity(&conn, EntityKind::Inventory, id).unwrap();
        assert_eq!(batches_count(&conn, id), 0);
    }

    #[test]
    fn test_null_counter_reads_as_zero() {
        let conn = setup_test_conn();
        let id = insert_inventory(&conn, "Gauze", None, 100);
        conn.execute(
            "UPDATE inventories SET batches_count = NULL WHERE id = ?",
            [id],
        )
        .unwrap();

        // NULL cache with no children is consistent
        assert_eq!(drift(&conn, EntityKind::Inventory, id), 0);

        insert_inventory_children(&conn, "batches", id, 1);
        let found = check_integrity(&conn, EntityKind::Inventory, id).unwrap();
        assert_eq!(found[0].cached, 0);
        assert_eq!(found[0].actual, 1);
    }

    #[test]
    fn test_fix_then_check_is_clean() {
        let conn = setup_test_conn();
        let id = insert_inventory(&conn, "Aspirin", None, 500);
        insert_inventory_children(&conn, "batches", id, 4);
        insert_inventory_children(&conn, "inventory_logs", id, 2);
        conn.execute(
            "UPDATE inventories SET receipts_count = 9 WHERE id = ?",
            [id],
        )
        .unwrap();

        let repaired = fix_integrity(&conn, EntityKind::Inventory, id).unwrap();
        assert_eq!(repaired.len(), 3);
        assert_eq!(drift(&conn, EntityKind::Inventory, id), 0);

        let statuses = counter_statuses(&conn, EntityKind::Inventory, id).unwrap();
        let receipts = statuses
            .iter()
            .find(|s| s.counter == "receipts_count")
            .unwrap();
        assert_eq!(receipts.cached, 0);
    }

    #[test]
    fn test_store_filtered_counters() {
        let conn = setup_test_conn();
        let a = insert_store(&conn, "A");
        let b = insert_store(&conn, "B");
        let item = insert_inventory(&conn, "Mask", None, 50);
        insert_transfer(&conn, a, b, item, "pending");
        insert_transfer(&conn, a, b, item, "pending");
        insert_transfer(&conn, a, b, item, "completed");

        let found = check_integrity(&conn, EntityKind::Store, a).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].counter, "pending_outgoing_transfers_count");
        assert_eq!(found[0].actual, 2);

        let incoming = check_integrity(&conn, EntityKind::Store, b).unwrap();
        assert_eq!(incoming[0].counter, "pending_incoming_transfers_count");

        fix_integrity(&conn, EntityKind::Store, a).unwrap();
        assert_eq!(drift(&conn, EntityKind::Store, a), 0);
    }

    #[test]
    fn test_unknown_entity_is_error() {
        let conn = setup_test_conn();
        let err = check_integrity(&conn, EntityKind::Store, 999).unwrap_err();
        assert!(matches!(err, StockrxError::EntityNotFound { id: 999, .. }));
    }

    #[test]
    fn test_missing_column_reads_zero_but_cannot_be_fixed() {
        let conn = setup_test_conn();
        conn.execute_batch("ALTER TABLE inventories DROP COLUMN receipts_count")
            .unwrap();
        let id = insert_inventory(&conn, "Legacy", None, 10);

        let statuses = counter_statuses(&conn, EntityKind::Inventory, id).unwrap();
        let receipts = statuses
            .iter()
            .find(|s| s.counter == "receipts_count")
            .unwrap();
        assert!(!receipts.column_present);
        assert_eq!(receipts.cached, 0);
        assert_eq!(drift(&conn, EntityKind::Inventory, id), 0);

        insert_inventory_children(&conn, "receipts", id, 1);
        insert_inventory_children(&conn, "batches", id, 1);
        let err = fix_integrity(&conn, EntityKind::Inventory, id).unwrap_err();
        assert!(matches!(err, StockrxError::MissingCounterColumn { .. }));

        // Savepoint rolled back the batches_count repair as well
        assert_eq!(batches_count(&conn, id), 0);
    }
}
