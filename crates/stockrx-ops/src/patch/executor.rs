// crates/stockrx-ops/src/patch/executor.rs
// Batch execution driver: offset loop, guardrails, audit log and locking

use super::{DataPatch, ExecutionOptions, PatchOptions, PatchRegistry, RecordOutcome, ValueTotals};
use crate::db::{
    DatabasePool, ExecutionSummary, acquire_patch_lock_sync,
    finish_execution_sync, release_patch_lock_sync, start_execution_sync,
};
use crate::error::{Result, StockrxError};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-record failures kept in the report; later ones are only counted
const MAX_RECORDED_FAILURES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Stalled,
    TimedOut,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    fn from_error(err: &StockrxError) -> Self {
        match err {
            StockrxError::Stalled { .. } => RunStatus::Stalled,
            StockrxError::Timeout { .. } => RunStatus::TimedOut,
            StockrxError::Cancelled => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        }
    }
}

/// Final (or partial) statistics for one run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub patch_name: String,
    pub status: RunStatus,
    pub dry_run: bool,
    pub target_count: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub batches: u64,
    pub elapsed_ms: u64,
    pub totals: Option<ValueTotals>,
    /// What `totals` measures (e.g. total price, counter drift)
    pub totals_label: &'static str,
    pub failures: Vec<RecordOutcome>,
    /// Message of the run-fatal error, if any
    pub error: Option<String>,
    pub memory_limit_mb: Option<u64>,
    pub peak_memory_mb: Option<u64>,
    pub execution_id: Option<i64>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// Running totals across batches
#[derive(Default)]
struct Accumulator {
    target_count: u64,
    processed: u64,
    succeeded: u64,
    failed: u64,
    batches: u64,
    totals: Option<ValueTotals>,
    failures: Vec<RecordOutcome>,
    memory_warned: bool,
}

impl Accumulator {
    fn absorb(&mut self, batch: super::BatchResult) {
        self.batches += 1;
        self.processed += batch.count as u64;
        self.succeeded += batch.succeeded() as u64;
        self.failed += batch.failed() as u64;
        if let Some(t) = batch.totals {
            let totals = self.totals.get_or_insert_with(ValueTotals::default);
            totals.merge(&t);
        }
        for record in batch.records {
            if record.is_failure() && self.failures.len() < MAX_RECORDED_FAILURES {
                self.failures.push(record);
            }
        }
    }
}

/// Drives a patch through `execute_batch` until it reports completion.
///
/// One pooled connection per batch; batches run strictly in offset order.
pub struct PatchExecutor {
    pool: Arc<DatabasePool>,
    cancel: CancellationToken,
    /// Identifies this process in `patch_locks`
    holder: String,
}

impl PatchExecutor {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self {
            pool,
            cancel: CancellationToken::new(),
            holder: format!("{}:{}", std::process::id(), uuid::Uuid::new_v4().simple()),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build `name` from the registry and run it.
    ///
    /// Unknown patches, invalid options and a held lock fail here, before any
    /// record is touched. Everything after that is reported in the returned
    /// `ExecutionReport`, including run-fatal errors.
    pub async fn execute(
        &self,
        registry: &PatchRegistry,
        name: &str,
        options: &PatchOptions,
        exec: &ExecutionOptions,
    ) -> Result<ExecutionReport> {
        let patch: Arc<dyn DataPatch> = Arc::from(registry.create_patch(name, options)?);
        self.run(name, patch, &options.to_json(), exec).await
    }

    pub async fn run(
        &self,
        name: &str,
        patch: Arc<dyn DataPatch>,
        options_json: &str,
        exec: &ExecutionOptions,
    ) -> Result<ExecutionReport> {
        let dry_run = patch.dry_run();
        let started = Instant::now();

        if !dry_run {
            self.acquire_lock(name, exec).await?;
        }

        let mut acc = Accumulator::default();
        let mut execution_id = None;
        let outcome = self
            .drive(
                name,
                &patch,
                options_json,
                exec,
                started,
                &mut acc,
                &mut execution_id,
            )
            .await;

        let (status, error) = match &outcome {
            Ok(()) => (RunStatus::Completed, None),
            Err(e) => (RunStatus::from_error(e), Some(e.to_string())),
        };

        if let Some(id) = execution_id {
            let summary_status = status.as_str();
            let (processed, succeeded, failed) = (acc.processed, acc.succeeded, acc.failed);
            let error_text = error.clone();
            self.pool
                .try_interact_warn("Failed to finish execution audit row", move |conn| {
                    let summary = ExecutionSummary {
                        status: summary_status,
                        processed,
                        succeeded,
                        failed,
                        error: error_text.as_deref(),
                    };
                    Ok(finish_execution_sync(conn, id, &summary)?)
                })
                .await;
        }

        if !dry_run {
            self.release_lock(name).await;
        }

        let report = ExecutionReport {
            patch_name: name.to_string(),
            status,
            dry_run,
            target_count: acc.target_count,
            processed: acc.processed,
            succeeded: acc.succeeded,
            failed: acc.failed,
            batches: acc.batches,
            elapsed_ms: started.elapsed().as_millis() as u64,
            totals: acc.totals,
            totals_label: patch.totals_label(),
            failures: acc.failures,
            error,
            memory_limit_mb: exec.memory_limit_mb,
            peak_memory_mb: peak_rss_mb(),
            execution_id,
        };

        match &outcome {
            Ok(()) => info!(
                patch = name,
                processed = report.processed,
                failed = report.failed,
                elapsed_ms = report.elapsed_ms,
                dry_run,
                "Patch run completed"
            ),
            Err(e) if e.is_run_fatal() => warn!(
                patch = name,
                status = report.status.as_str(),
                processed = report.processed,
                error = %e,
                "Patch run aborted"
            ),
            Err(e) => error!(
                patch = name,
                processed = report.processed,
                error = %e,
                "Patch run failed"
            ),
        }
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        name: &str,
        patch: &Arc<dyn DataPatch>,
        options_json: &str,
        exec: &ExecutionOptions,
        started: Instant,
        acc: &mut Accumulator,
        execution_id: &mut Option<i64>,
    ) -> Result<()> {
        let estimator = Arc::clone(patch);
        acc.target_count = self
            .pool
            .run(move |conn| estimator.estimate_target_count(conn))
            .await?;
        info!(
            patch = name,
            target_count = acc.target_count,
            batch_size = exec.batch_size,
            dry_run = patch.dry_run(),
            "Starting patch run"
        );

        let (audit_name, audit_options, dry_run, target) = (
            name.to_string(),
            options_json.to_string(),
            patch.dry_run(),
            acc.target_count,
        );
        *execution_id = self
            .pool
            .try_interact_warn("Failed to record execution start", move |conn| {
                let id = start_execution_sync(conn, &audit_name, &audit_options, dry_run, target)?;
                Ok(id)
            })
            .await;

        let mut offset = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                return Err(StockrxError::Cancelled);
            }
            if let Some(limit) = exec.timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    return Err(StockrxError::Timeout {
                        limit_secs: limit.as_secs(),
                        elapsed_secs: elapsed.as_secs(),
                    });
                }
            }

            let worker = Arc::clone(patch);
            let size = exec.batch_size;
            let batch = self
                .pool
                .run(move |conn| worker.execute_batch(conn, size, offset))
                .await?;

            let (count, finished) = (batch.count, batch.finished);
            acc.absorb(batch);
            debug!(
                patch = name,
                offset,
                count,
                processed = acc.processed,
                target = acc.target_count,
                "Batch done"
            );
            self.check_memory(exec, acc);

            if finished {
                return Ok(());
            }
            if count == 0 {
                return Err(StockrxError::Stalled { offset });
            }
            offset += count;
        }
    }

    fn check_memory(&self, exec: &ExecutionOptions, acc: &mut Accumulator) {
        let (Some(limit), Some(peak)) = (exec.memory_limit_mb, peak_rss_mb()) else {
            return;
        };
        if peak > limit && !acc.memory_warned {
            warn!(
                peak_mb = peak,
                limit_mb = limit,
                "Peak memory above MEMORY_LIMIT hint (not enforced)"
            );
            acc.memory_warned = true;
        }
    }

    async fn acquire_lock(&self, name: &str, exec: &ExecutionOptions) -> Result<()> {
        let (lock_name, holder) = (name.to_string(), self.holder.clone());
        let stale_after = chrono::Duration::from_std(exec.lock_stale_after)
            .map_err(|e| StockrxError::Config(format!("lock_stale_secs: {e}")))?;

        let acquired = self
            .pool
            .run_with_retry(move |conn| {
                acquire_patch_lock_sync(conn, &lock_name, &holder, stale_after)
            })
            .await?;
        debug!(patch = name, holder = %self.holder, ?acquired, "Patch lock acquired");
        Ok(())
    }

    async fn release_lock(&self, name: &str) {
        let (lock_name, holder) = (name.to_string(), self.holder.clone());
        self.pool
            .try_interact_warn("Failed to release patch lock", move |conn| {
                Ok(release_patch_lock_sync(conn, &lock_name, &holder)?)
            })
            .await;
    }
}

/// Peak resident set size of this process, in MB.
#[cfg(unix)]
fn peak_rss_mb() -> Option<u64> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage only writes into the struct we pass it.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: rc == 0 means the kernel filled the struct.
    let max = unsafe { usage.assume_init() }.ru_maxrss.max(0) as u64;
    // ru_maxrss is bytes on macOS and KiB elsewhere
    let kib = if cfg!(target_os = "macos") {
        max / 1024
    } else {
        max
    };
    Some(kib / 1024)
}

#[cfg(not(unix))]
fn peak_rss_mb() -> Option<u64> {
    None
}
