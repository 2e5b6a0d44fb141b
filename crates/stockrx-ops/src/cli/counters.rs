// crates/stockrx-ops/src/cli/counters.rs
// CLI handler for `stockrx counters` commands

use super::{CliContext, CounterAction, print_json, report};
use anyhow::Result;
use stockrx::reconcile::{ScanOptions, bulk_scan, counter_statuses, fix_integrity};

pub async fn run(ctx: &CliContext, action: CounterAction) -> Result<()> {
    let pool = ctx.open_pool().await?;

    match action {
        CounterAction::Check { kind, id } => {
            let statuses = pool
                .run(move |conn| counter_statuses(conn, kind, id))
                .await?;
            if ctx.json {
                return print_json(&statuses);
            }
            report::print_statuses(&format!("{} #{}", kind, id), &statuses);
            let mismatched = statuses.iter().filter(|s| !s.is_consistent()).count();
            if mismatched > 0 {
                println!(
                    "\n{} counter(s) out of sync. Run `stockrx counters fix {} {}` to repair.",
                    mismatched, kind, id
                );
            }
        }
        CounterAction::Fix { kind, id } => {
            let repaired = pool
                .run_with_retry(move |conn| fix_integrity(conn, kind, id))
                .await?;
            if ctx.json {
                return print_json(&repaired);
            }
            report::print_repairs(&format!("{} #{}", kind, id), &repaired);
        }
        CounterAction::Scan { kind, fix, top } => {
            let opts = ScanOptions {
                fix,
                top_n: top,
                ..Default::default()
            };
            let scan = pool.run(move |conn| bulk_scan(conn, kind, &opts)).await?;
            if ctx.json {
                return print_json(&scan);
            }
            report::print_scan(&scan);
        }
    }

    Ok(())
}
