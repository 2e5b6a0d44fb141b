// crates/stockrx-ops/src/cli/patch.rs
// CLI handlers for `stockrx patch` commands

use super::{CliContext, PatchAction, print_json, report};
use anyhow::{Context, Result, bail};
use dialoguer::Confirm;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use stockrx::config::StockrxConfig;
use stockrx::db::{execution_counts_by_status_sync, recent_executions_sync};
use stockrx::patch::{DataPatch, ExecutionOptions, PatchExecutor, PatchOptions, PatchRegistry};
use stockrx::utils::truncate;
use tracing::info;

pub async fn run(ctx: &CliContext, action: PatchAction) -> Result<()> {
    match action {
        PatchAction::List => list(ctx),
        PatchAction::Info { name } => info_cmd(ctx, &name),
        PatchAction::Execute { name, options, yes } => execute(ctx, &name, &options, yes).await,
        PatchAction::CheckAll { options } => check_all(ctx, &options).await,
        PatchAction::Stats => stats(ctx).await,
        PatchAction::Reload => reload(ctx),
        PatchAction::GenerateConfig { path, force } => generate_config(ctx, path, force),
        PatchAction::History { patch, limit } => history(ctx, patch, limit).await,
    }
}

fn registry(ctx: &CliContext) -> Result<PatchRegistry> {
    PatchRegistry::from_config(ctx.config_path.clone()).context("Failed to build patch registry")
}

fn list(ctx: &CliContext) -> Result<()> {
    let registry = registry(ctx)?;
    let patches = registry.list_patches();

    if ctx.json {
        let metadata: Vec<_> = patches.iter().map(|(_, m)| *m).collect();
        return print_json(&metadata);
    }
    if registry.is_empty() {
        println!("No patches registered.");
        return Ok(());
    }

    println!(
        "{:<30} {:<12} {:<8} DESCRIPTION",
        "NAME", "CATEGORY", "VERSION"
    );
    for (name, meta) in patches {
        println!(
            "{:<30} {:<12} {:<8} {}",
            name,
            meta.category.as_str(),
            meta.version,
            truncate(meta.description, 60)
        );
    }
    Ok(())
}

fn info_cmd(ctx: &CliContext, name: &str) -> Result<()> {
    let registry = registry(ctx)?;
    let Some(meta) = registry.patch_metadata(name) else {
        return Err(stockrx::StockrxError::UnknownPatch {
            name: name.to_string(),
            available: registry.names(),
        }
        .into());
    };

    if ctx.json {
        return print_json(meta);
    }

    println!("{} v{}", meta.name, meta.version);
    println!("  {}", meta.description);
    println!("  Category: {}", meta.category.as_str());
    println!("  Tables:   {}", meta.target_tables.join(", "));
    if !meta.options.is_empty() {
        println!("\nOptions:");
        for opt in meta.options {
            let required = if opt.required { " (required)" } else { "" };
            let default = opt
                .default
                .map(|d| format!(" [default: {}]", d))
                .unwrap_or_default();
            println!(
                "  {:<24} {}{}{}",
                opt.key, opt.description, required, default
            );
        }
    }
    println!("\nExecution options: BATCH_SIZE, TIMEOUT (s), MEMORY_LIMIT (MB), DRY_RUN");
    Ok(())
}

async fn execute(ctx: &CliContext, name: &str, pairs: &[String], yes: bool) -> Result<()> {
    // Everything up to the confirmation prompt is validation only
    let options = PatchOptions::parse_pairs(pairs)?;
    let exec = ExecutionOptions::resolve(&options, &ctx.config.patches)?;
    let registry = registry(ctx)?;
    let patch: Arc<dyn DataPatch> = Arc::from(registry.create_patch(name, &options)?);

    let pool = ctx.open_pool().await?;
    let estimator = Arc::clone(&patch);
    let target_count = pool
        .run(move |conn| estimator.estimate_target_count(conn))
        .await?;

    if !ctx.json {
        println!(
            "{}: {} record(s) targeted, batch size {}{}",
            name,
            target_count,
            exec.batch_size,
            if patch.dry_run() { ", dry run" } else { "" }
        );
        if !options.is_empty() {
            for (key, value) in options.iter() {
                println!("  {}={}", key, value);
            }
        }
    }

    if !patch.dry_run() && !yes && !ctx.env.assume_yes {
        if !std::io::stdin().is_terminal() {
            bail!("Refusing to modify data without confirmation; pass --yes or set DRY_RUN=true");
        }
        let proceed = Confirm::new()
            .with_prompt(format!("Apply {} to {} record(s)?", name, target_count))
            .default(false)
            .interact()?;
        if !proceed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let executor = PatchExecutor::new(pool);
    let token = executor.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received, stopping after the current batch...");
            token.cancel();
        }
    });

    info!(patch = name, "Executing patch");
    let result = executor.run(name, patch, &options.to_json(), &exec).await;
    interrupt.abort();
    let report = result?;

    if ctx.json {
        print_json(&report)?;
    } else {
        report::print_execution(&report);
    }

    if !report.is_success() {
        bail!(
            "patch {} did not complete ({})",
            name,
            report.error.as_deref().unwrap_or(report.status.as_str())
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct Estimate {
    patch: String,
    target_count: Option<u64>,
    skipped: Option<String>,
}

async fn check_all(ctx: &CliContext, pairs: &[String]) -> Result<()> {
    let options = PatchOptions::parse_pairs(pairs)?;
    let registry = registry(ctx)?;
    let pool = ctx.open_pool().await?;

    let mut estimates = Vec::new();
    for (name, _) in registry.list_patches() {
        let estimate = match registry.create_patch(name, &options) {
            Ok(patch) => {
                let patch: Arc<dyn DataPatch> = Arc::from(patch);
                let estimated = pool
                    .run(move |conn| patch.estimate_target_count(conn))
                    .await;
                match estimated {
                    Ok(count) => Estimate {
                        patch: name.to_string(),
                        target_count: Some(count),
                        skipped: None,
                    },
                    Err(e) => Estimate {
                        patch: name.to_string(),
                        target_count: None,
                        skipped: Some(e.to_string()),
                    },
                }
            }
            Err(e) => Estimate {
                patch: name.to_string(),
                target_count: None,
                skipped: Some(e.to_string()),
            },
        };
        estimates.push(estimate);
    }

    if ctx.json {
        return print_json(&estimates);
    }

    println!("Projected impact of {} patch(es):", registry.len());
    for e in &estimates {
        match (&e.target_count, &e.skipped) {
            (Some(count), _) => println!("  {:<30} {} record(s)", e.patch, count),
            (None, Some(reason)) => println!("  {:<30} skipped: {}", e.patch, reason),
            (None, None) => {}
        }
    }
    let total: u64 = estimates.iter().filter_map(|e| e.target_count).sum();
    println!("  Total: {} record(s)", total);
    Ok(())
}

async fn stats(ctx: &CliContext) -> Result<()> {
    let registry = registry(ctx)?;
    let stats = registry.stats();
    let pool = ctx.open_pool().await?;
    let runs = pool
        .interact(|conn| Ok(execution_counts_by_status_sync(conn)?))
        .await?;

    if ctx.json {
        #[derive(Serialize)]
        struct Stats<'a> {
            registry: &'a stockrx::patch::RegistryStats,
            executions: &'a [(String, i64)],
        }
        return print_json(&Stats {
            registry: &stats,
            executions: &runs,
        });
    }

    println!("Registered patches: {}", stats.total);
    for (category, count) in &stats.by_category {
        println!("  {:<14} {}", category, count);
    }
    if !stats.disabled.is_empty() {
        println!("Disabled by config: {}", stats.disabled.join(", "));
    }

    println!("\nExecutions:");
    if runs.is_empty() {
        println!("  none recorded");
    }
    for (status, count) in &runs {
        println!("  {:<14} {}", status, count);
    }
    Ok(())
}

fn reload(ctx: &CliContext) -> Result<()> {
    let validation = StockrxConfig::load_from(&ctx.config_path)?.validate();
    if !validation.is_valid() {
        bail!("{}", validation.report());
    }

    let mut registry = registry(ctx)?;
    let active = registry.reload()?;
    let stats = registry.stats();
    println!(
        "Registry reloaded from {}: {} active, {} disabled",
        ctx.config_path.display(),
        active,
        stats.disabled.len()
    );
    if !validation.warnings.is_empty() {
        println!("{}", validation.report());
    }
    Ok(())
}

fn generate_config(ctx: &CliContext, path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| ctx.config_path.clone());
    StockrxConfig::write_starter(&path, force)?;
    println!("Wrote starter config to {}", path.display());
    Ok(())
}

async fn history(ctx: &CliContext, patch: Option<String>, limit: usize) -> Result<()> {
    let pool = ctx.open_pool().await?;
    let rows = pool
        .interact(move |conn| Ok(recent_executions_sync(conn, patch.as_deref(), limit)?))
        .await?;

    if ctx.json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No executions recorded.");
        return Ok(());
    }

    println!(
        "{:<6} {:<30} {:<10} {:>9} {:>7}  STARTED",
        "ID", "PATCH", "STATUS", "PROCESSED", "FAILED"
    );
    for row in rows {
        let status = if row.dry_run {
            format!("{}*", row.status)
        } else {
            row.status
        };
        println!(
            "{:<6} {:<30} {:<10} {:>9} {:>7}  {}",
            row.id, row.patch_name, status, row.processed, row.failed, row.started_at
        );
    }
    println!("\n* dry run");
    Ok(())
}
