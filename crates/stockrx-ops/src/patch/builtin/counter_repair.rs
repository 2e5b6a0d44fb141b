// crates/stockrx-ops/src/patch/builtin/counter_repair.rs
// counter_cache_repair: run the reconciliation engine over a whole table

use crate::error::{Result, StockrxError};
use crate::patch::{
    BatchResult, DataPatch, OptionSpec, PatchCategory, PatchMetadata, PatchOptions,
    RecordOutcome, TargetSnapshot, ValueTotals, process_records,
};
use crate::reconcile::{EntityKind, check_integrity, fix_integrity};
use rusqlite::Connection;
use std::str::FromStr;
use tracing::debug;

pub const NAME: &str = "counter_cache_repair";

const OPTIONS: &[OptionSpec] = &[OptionSpec {
    key: "ENTITY",
    description: "inventory | store",
    required: false,
    default: Some("inventory"),
}];

pub fn metadata() -> PatchMetadata {
    PatchMetadata {
        name: NAME,
        description: "Resynchronize cached counters from live child counts",
        category: PatchCategory::Maintenance,
        target_tables: &["inventories", "stores"],
        version: "1.0.0",
        options: OPTIONS,
    }
}

#[derive(Debug)]
pub struct CounterRepairPatch {
    kind: EntityKind,
    dry_run: bool,
    snapshot: TargetSnapshot,
}

impl CounterRepairPatch {
    pub fn new(options: &PatchOptions) -> Result<Self> {
        let kind = match options.get("ENTITY") {
            Some(value) => EntityKind::from_str(value).map_err(|_| {
                StockrxError::invalid_option(
                    "entity",
                    format!("must be inventory or store, got '{value}'"),
                )
            })?,
            None => EntityKind::Inventory,
        };
        Ok(Self {
            kind,
            dry_run: options.dry_run()?,
            snapshot: TargetSnapshot::new(),
        })
    }

    fn target_ids_sql(&self) -> String {
        format!("SELECT id FROM {} ORDER BY id", self.kind.table())
    }
}

impl DataPatch for CounterRepairPatch {
    fn estimate_target_count(&self, conn: &Connection) -> Result<u64> {
        let ids = self.snapshot.ids(conn, &self.target_ids_sql(), [])?;
        Ok(ids.len() as u64)
    }

    fn execute_batch(
        &self,
        conn: &Connection,
        batch_size: usize,
        offset: usize,
    ) -> Result<BatchResult> {
        let (ids, finished) = self
            .snapshot
            .page(conn, &self.target_ids_sql(), [], batch_size, offset)?;
        if ids.is_empty() {
            return Ok(BatchResult::exhausted());
        }

        // before/after = total absolute drift before and after this batch
        let mut totals = ValueTotals::default();
        let records = process_records(conn, &ids, |conn, id| {
            let found = if self.dry_run {
                check_integrity(conn, self.kind, id)?
            } else {
                fix_integrity(conn, self.kind, id)?
            };
            if found.is_empty() {
                return Ok(RecordOutcome::Unchanged { id });
            }
            let drift: i64 = found.iter().map(|d| d.difference().abs()).sum();
            totals.add(drift, 0);
            Ok(RecordOutcome::Updated { id })
        })?;

        debug!(
            kind = self.kind.as_str(),
            offset,
            count = ids.len(),
            drift = totals.before,
            "Counter repair batch"
        );
        Ok(BatchResult {
            count: ids.len(),
            finished,
            records,
            totals: Some(totals),
        })
    }

    fn dry_run(&self) -> bool {
        self.dry_run
    }

    fn totals_label(&self) -> &'static str {
        "Counter drift"
    }
}

pub fn create(options: &PatchOptions) -> Result<Box<dyn DataPatch>> {
    Ok(Box::new(CounterRepairPatch::new(options)?))
}
