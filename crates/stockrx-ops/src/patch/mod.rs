// crates/stockrx-ops/src/patch/mod.rs
// Batch data-patch contract, registry and execution driver

pub mod builtin;
mod executor;
mod options;
mod registry;
mod snapshot;

pub use executor::{ExecutionReport, PatchExecutor, RunStatus};
pub use options::{
    DEFAULT_BATCH_SIZE, ExecutionOptions, MAX_BATCH_SIZE, MIN_BATCH_SIZE, PatchOptions,
};
pub use registry::{
    OptionSpec, PatchCategory, PatchFactory, PatchMetadata, PatchRegistry, RegistryStats,
};
pub use snapshot::TargetSnapshot;

use crate::db::with_savepoint;
use crate::error::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

/// A named unit of business logic that mutates a record set in chunks.
///
/// Implementations validate every option in their factory, so a value of this
/// type is always runnable. `execute_batch` must walk records in a stable
/// order: repeated calls with increasing offsets never skip or repeat a
/// record of an unchanged dataset.
pub trait DataPatch: Send + Sync {
    /// How many records the patch would touch. Read-only; uses the same
    /// filtering as `execute_batch`.
    fn estimate_target_count(&self, conn: &Connection) -> Result<u64>;

    /// Process up to `batch_size` records starting at `offset`.
    fn execute_batch(
        &self,
        conn: &Connection,
        batch_size: usize,
        offset: usize,
    ) -> Result<BatchResult>;

    /// When true the patch performs no persistent mutation, but reports the
    /// same statistics a real run would.
    fn dry_run(&self) -> bool;

    /// What `BatchResult::totals` sums, shown next to them in reports
    fn totals_label(&self) -> &'static str {
        "Totals"
    }
}

/// Per-record result of one batch step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Changed (or would change, in a dry run)
    Updated { id: i64 },
    /// Already in the target state
    Unchanged { id: i64 },
    Failed { id: i64, message: String },
}

impl RecordOutcome {
    pub fn id(&self) -> i64 {
        match self {
            RecordOutcome::Updated { id }
            | RecordOutcome::Unchanged { id }
            | RecordOutcome::Failed { id, .. } => *id,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RecordOutcome::Failed { .. })
    }
}

/// Sum of a tracked value before and after the patch (e.g. total price)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValueTotals {
    pub before: i64,
    pub after: i64,
}

impl ValueTotals {
    pub fn delta(&self) -> i64 {
        self.after - self.before
    }

    pub fn add(&mut self, before: i64, after: i64) {
        self.before += before;
        self.after += after;
    }

    pub fn merge(&mut self, other: &ValueTotals) {
        self.add(other.before, other.after);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    /// Records processed in this batch, failures included
    pub count: usize,
    /// True once `offset + count` reached the end of the target set
    pub finished: bool,
    pub records: Vec<RecordOutcome>,
    pub totals: Option<ValueTotals>,
}

impl BatchResult {
    /// Batch past the end of the target set
    pub fn exhausted() -> Self {
        Self {
            finished: true,
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| !r.is_failure()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.iter().filter(|r| r.is_failure()).count()
    }
}

/// Apply `f` to each id, isolating every record in its own savepoint.
///
/// A record whose closure fails is rolled back and reported as `Failed`; the
/// rest of the batch still commits as one unit.
pub(crate) fn process_records<F>(
    conn: &Connection,
    ids: &[i64],
    mut f: F,
) -> Result<Vec<RecordOutcome>>
where
    F: FnMut(&Connection, i64) -> Result<RecordOutcome>,
{
    with_savepoint(conn, "patch_batch", |conn| {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            match with_savepoint(conn, "patch_record", |conn| f(conn, id)) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    debug!(id, error = %e, "Record failed");
                    outcomes.push(RecordOutcome::Failed {
                        id,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(outcomes)
    })
}
