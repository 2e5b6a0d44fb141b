// crates/stockrx-ops/src/cli/report.rs
// Text rendering for execution and reconciliation reports

use stockrx::patch::{ExecutionReport, RecordOutcome};
use stockrx::reconcile::{AggregateReport, CounterStatus, Discrepancy};
use stockrx::utils::{signed, truncate};

/// Failures listed before "... and N more"
const FAILURES_SHOWN: usize = 10;

pub fn print_execution(report: &ExecutionReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("Patch: {}{}", report.patch_name, mode);
    println!("  Status:    {}", report.status.as_str());
    println!(
        "  Targets:   {}   Processed: {}   Succeeded: {}   Failed: {}",
        report.target_count, report.processed, report.succeeded, report.failed
    );
    println!(
        "  Batches:   {}   Elapsed: {:.2}s",
        report.batches,
        report.elapsed().as_secs_f64()
    );

    if let Some(totals) = report.totals {
        println!(
            "  {}: {} -> {} ({})",
            report.totals_label,
            totals.before,
            totals.after,
            signed(totals.delta())
        );
    }

    match (report.peak_memory_mb, report.memory_limit_mb) {
        (Some(peak), Some(limit)) => println!("  Memory:    peak {} MB (hint {} MB)", peak, limit),
        (Some(peak), None) => println!("  Memory:    peak {} MB", peak),
        _ => {}
    }

    if let Some(ref error) = report.error {
        println!("  Error:     {}", error);
    }

    if !report.failures.is_empty() {
        println!("\nRecord failures:");
        for failure in report.failures.iter().take(FAILURES_SHOWN) {
            if let RecordOutcome::Failed { id, message } = failure {
                println!("  #{}: {}", id, truncate(message, 120));
            }
        }
        let hidden = report.failed.saturating_sub(FAILURES_SHOWN as u64);
        if hidden > 0 {
            println!("  ... and {} more", hidden);
        }
    }
}

pub fn print_statuses(label: &str, statuses: &[CounterStatus]) {
    println!("{}", label);
    for status in statuses {
        let mark = if status.is_consistent() { "ok" } else { "MISMATCH" };
        let note = if status.column_present { "" } else { " (column missing)" };
        println!(
            "  {:<36} cached {:>8}  actual {:>8}  {}{}",
            status.counter, status.cached, status.actual, mark, note
        );
    }
}

pub fn print_repairs(label: &str, repaired: &[Discrepancy]) {
    if repaired.is_empty() {
        println!("{}: all counters consistent, nothing to fix", label);
        return;
    }
    println!("{}: repaired {} counter(s)", label, repaired.len());
    for d in repaired {
        println!(
            "  {:<36} {} -> {} ({})",
            d.counter,
            d.cached,
            d.actual,
            signed(d.difference())
        );
    }
}

pub fn print_scan(report: &AggregateReport) {
    println!("Counter scan: {}", report.kind);
    println!("  Entities scanned:          {}", report.entities_scanned);
    println!(
        "  With discrepancies:        {}",
        report.entities_with_discrepancies
    );
    println!(
        "  Total discrepancies:       {}",
        report.total_discrepancies
    );
    println!("  Counters fixed:            {}", report.counters_fixed);

    if !report.worst_offenders.is_empty() {
        println!("\nWorst offenders:");
        for offender in &report.worst_offenders {
            println!(
                "  #{:<8} {} counter(s), drift {}: {}",
                offender.entity_id,
                offender.counters.len(),
                offender.total_drift,
                offender.counters.join(", ")
            );
        }
    }

    if !report.failures.is_empty() {
        println!("\nFailures:");
        for failure in &report.failures {
            println!(
                "  #{}: {}",
                failure.entity_id,
                truncate(&failure.error, 120)
            );
        }
    }
}
