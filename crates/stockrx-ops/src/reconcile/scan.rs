// crates/stockrx-ops/src/reconcile/scan.rs
// Collection-wide integrity scan with optional repair

use super::{EntityKind, check_integrity, fix_integrity};
use crate::error::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

/// Default page size when walking a table by primary key
const DEFAULT_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Repair every inconsistent counter found
    pub fix: bool,
    /// How many worst offenders to keep in the report
    pub top_n: usize,
    pub page_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            fix: false,
            top_n: 10,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// An entity whose check or repair failed. The scan continues past it.
#[derive(Debug, Clone, Serialize)]
pub struct EntityFailure {
    pub entity_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Offender {
    pub entity_id: i64,
    /// Names of the mismatched counters
    pub counters: Vec<&'static str>,
    /// Sum of absolute drift across those counters
    pub total_drift: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub kind: EntityKind,
    pub entities_scanned: usize,
    pub entities_with_discrepancies: usize,
    pub total_discrepancies: usize,
    pub counters_fixed: usize,
    pub failures: Vec<EntityFailure>,
    pub worst_offenders: Vec<Offender>,
}

impl AggregateReport {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entities_scanned: 0,
            entities_with_discrepancies: 0,
            total_discrepancies: 0,
            counters_fixed: 0,
            failures: Vec::new(),
            worst_offenders: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.total_discrepancies == 0 && self.failures.is_empty()
    }
}

fn next_page(conn: &Connection, kind: EntityKind, after_id: i64, limit: usize) -> Result<Vec<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE id > ? ORDER BY id LIMIT ?",
        kind.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(rusqlite::params![after_id, limit as i64], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Check (and optionally repair) every entity of `kind` in primary-key order.
///
/// Per-entity failures are logged and recorded; only a failure to page
/// through the parent table itself aborts the scan.
pub fn bulk_scan(
    conn: &Connection,
    kind: EntityKind,
    opts: &ScanOptions,
) -> Result<AggregateReport> {
    let mut report = AggregateReport::new(kind);
    let mut offenders: Vec<Offender> = Vec::new();
    let page_size = opts.page_size.max(1);
    let mut last_id = 0i64;

    loop {
        let ids = next_page(conn, kind, last_id, page_size)?;
        let Some(&tail) = ids.last() else {
            break;
        };
        last_id = tail;

        for id in ids {
            report.entities_scanned += 1;

            let outcome = if opts.fix {
                fix_integrity(conn, kind, id)
            } else {
                check_integrity(conn, kind, id)
            };

            match outcome {
                Ok(discrepancies) if discrepancies.is_empty() => {}
                Ok(discrepancies) => {
                    report.entities_with_discrepancies += 1;
                    report.total_discrepancies += discrepancies.len();
                    if opts.fix {
                        report.counters_fixed += discrepancies.len();
                    }
                    offenders.push(Offender {
                        entity_id: id,
                        counters: discrepancies.iter().map(|d| d.counter).collect(),
                        total_drift: discrepancies.iter().map(|d| d.difference().abs()).sum(),
                    });
                }
                Err(e) => {
                    warn!(
                        kind = kind.as_str(),
                        id,
                        error = %e,
                        "Integrity check failed for entity"
                    );
                    report.failures.push(EntityFailure {
                        entity_id: id,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    offenders.sort_by(|a, b| {
        b.counters
            .len()
            .cmp(&a.counters.len())
            .then(a.entity_id.cmp(&b.entity_id))
    });
    offenders.truncate(opts.top_n);
    report.worst_offenders = offenders;

    info!(
        kind = kind.as_str(),
        scanned = report.entities_scanned,
        with_discrepancies = report.entities_with_discrepancies,
        fixed = report.counters_fixed,
        failures = report.failures.len(),
        "Counter scan complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    #[test]
    fn test_scan_empty_table() {
        let conn = setup_test_conn();
        let opts = ScanOptions::default();
        let report = bulk_scan(&conn, EntityKind::Inventory, &opts).unwrap();
        assert_eq!(report.entities_scanned, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_scan_ranks_worst_offenders() {
        let conn = setup_test_conn();
        let clean = insert_inventory(&conn, "Clean", None, 100);
        let one = insert_inventory(&conn, "One", None, 100);
        let two_a = insert_inventory(&conn, "TwoA", None, 100);
        let two_b = insert_inventory(&conn, "TwoB", None, 100);

        insert_inventory_children(&conn, "batches", one, 5);
        insert_inventory_children(&conn, "batches", two_b, 1);
        insert_inventory_children(&conn, "receipts", two_b, 1);
        insert_inventory_children(&conn, "shipments", two_a, 2);
        insert_inventory_children(&conn, "inventory_logs", two_a, 1);

        let opts = ScanOptions {
            top_n: 2,
            page_size: 2,
            ..Default::default()
        };
        let report = bulk_scan(&conn, EntityKind::Inventory, &opts).unwrap();

        assert_eq!(report.entities_scanned, 4);
        assert_eq!(report.entities_with_discrepancies, 3);
        assert_eq!(report.total_discrepancies, 5);
        assert_eq!(report.counters_fixed, 0);
        let ranked: Vec<i64> = report.worst_offenders.iter().map(|o| o.entity_id).collect();
        assert_eq!(ranked, vec![two_a, two_b]);
        assert_eq!(report.worst_offenders[0].total_drift, 3);
        assert!(!ranked.contains(&clean));
    }

    #[test]
    fn test_scan_with_fix_leaves_collection_clean() {
        let conn = setup_test_conn();
        for i in 0..7 {
            let id = insert_inventory(&conn, &format!("Item {i}"), None, 100);
            insert_inventory_children(&conn, "batches", id, i);
        }

        let opts = ScanOptions {
            fix: true,
            page_size: 3,
            ..Default::default()
        };
        let report = bulk_scan(&conn, EntityKind::Inventory, &opts).unwrap();
        assert_eq!(report.entities_scanned, 7);
        assert_eq!(report.counters_fixed, 6);

        let defaults = ScanOptions::default();
        let again = bulk_scan(&conn, EntityKind::Inventory, &defaults).unwrap();
        assert!(again.is_clean());
    }

    #[test]
    fn test_scan_records_failures_and_continues() {
        let conn = setup_test_conn();
        conn.execute_batch("ALTER TABLE stores DROP COLUMN store_inventories_count")
            .unwrap();
        let broken = insert_store(&conn, "A");
        let healthy = insert_store(&conn, "B");
        let item = insert_inventory(&conn, "Mask", None, 10);
        conn.execute(
            "INSERT INTO store_inventories (store_id, inventory_id) VALUES (?, ?)",
            [broken, item],
        )
        .unwrap();
        insert_transfer(&conn, healthy, broken, item, "pending");

        let opts = ScanOptions {
            fix: true,
            ..Default::default()
        };
        let report = bulk_scan(&conn, EntityKind::Store, &opts).unwrap();

        assert_eq!(report.entities_scanned, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity_id, broken);
        assert!(report.failures[0].error.contains("store_inventories_count"));
        // The healthy store's outgoing counter was still repaired
        assert_eq!(report.counters_fixed, 1);
    }
}
