// crates/stockrx-ops/src/patch/snapshot.rs
// Frozen target id list for offset-based batching

use crate::error::Result;
use rusqlite::Connection;
use std::sync::OnceLock;

/// Ordered target ids, captured on first use and reused for every batch.
///
/// Offsets index into this list rather than into a live query, so a patch
/// that moves a record out of its own filter cannot shift later pages.
#[derive(Debug, Default)]
pub struct TargetSnapshot {
    ids: OnceLock<Vec<i64>>,
}

impl TargetSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids in primary-key order. `sql` must select one integer id column and
    /// is only run the first time.
    pub fn ids<P: rusqlite::Params>(
        &self,
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<&[i64]> {
        if let Some(ids) = self.ids.get() {
            return Ok(ids);
        }
        let mut stmt = conn.prepare(sql)?;
        let loaded = stmt
            .query_map(params, |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(self.ids.get_or_init(|| loaded))
    }

    /// The slice of ids for one batch, plus whether it reaches the end.
    pub fn page<P: rusqlite::Params>(
        &self,
        conn: &Connection,
        sql: &str,
        params: P,
        batch_size: usize,
        offset: usize,
    ) -> Result<(Vec<i64>, bool)> {
        let ids = self.ids(conn, sql, params)?;
        if offset >= ids.len() {
            return Ok((Vec::new(), true));
        }
        let end = offset.saturating_add(batch_size).min(ids.len());
        Ok((ids[offset..end].to_vec(), end >= ids.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    const ALL_INVENTORIES: &str = "SELECT id FROM inventories ORDER BY id";

    #[test]
    fn test_snapshot_is_frozen() {
        let conn = setup_test_conn();
        let a = insert_inventory(&conn, "A", None, 1);
        let b = insert_inventory(&conn, "B", None, 1);

        let snapshot = TargetSnapshot::new();
        assert_eq!(snapshot.ids(&conn, ALL_INVENTORIES, []).unwrap(), &[a, b]);

        insert_inventory(&conn, "C", None, 1);
        assert_eq!(snapshot.ids(&conn, ALL_INVENTORIES, []).unwrap().len(), 2);
    }

    #[test]
    fn test_paging() {
        let conn = setup_test_conn();
        let ids: Vec<i64> = (0..5)
            .map(|i| insert_inventory(&conn, &format!("I{i}"), None, 1))
            .collect();
        let snapshot = TargetSnapshot::new();

        let (page, finished) = snapshot.page(&conn, ALL_INVENTORIES, [], 2, 0).unwrap();
        assert_eq!(page, ids[0..2]);
        assert!(!finished);

        let (page, finished) = snapshot.page(&conn, ALL_INVENTORIES, [], 2, 4).unwrap();
        assert_eq!(page, ids[4..5]);
        assert!(finished);

        let (page, finished) = snapshot.page(&conn, ALL_INVENTORIES, [], 2, 5).unwrap();
        assert!(page.is_empty());
        assert!(finished);
    }
}
