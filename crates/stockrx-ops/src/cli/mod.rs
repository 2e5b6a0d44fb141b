// crates/stockrx-ops/src/cli/mod.rs
// CLI module for StockRx maintenance commands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stockrx::config::{EnvConfig, StockrxConfig};
use stockrx::db::pool::DatabasePool;
use stockrx::reconcile::EntityKind;

pub mod counters;
pub mod patch;
mod report;

#[derive(Parser)]
#[command(name = "stockrx")]
#[command(about = "StockRx maintenance: counter cache reconciliation and batch data patches")]
#[command(version)]
pub struct Cli {
    /// SQLite database path
    #[arg(long, global = true, env = "STOCKRX_DB")]
    pub db: Option<PathBuf>,

    /// Config file path (default: ~/.stockrx/config.toml)
    #[arg(long, global = true, env = "STOCKRX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Batch data patches
    Patch {
        #[command(subcommand)]
        action: PatchAction,
    },

    /// Counter cache checks and repairs
    Counters {
        #[command(subcommand)]
        action: CounterAction,
    },
}

#[derive(Subcommand)]
pub enum PatchAction {
    /// List registered patches
    List,

    /// Show a patch's metadata and accepted options
    Info { name: String },

    /// Run a patch (options as KEY=VALUE, e.g. ADJUSTMENT_TYPE=percentage DRY_RUN=true)
    Execute {
        name: String,

        #[arg(value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Estimate affected records for every registered patch
    CheckAll {
        #[arg(value_name = "KEY=VALUE")]
        options: Vec<String>,
    },

    /// Registry and execution history counts
    Stats,

    /// Rebuild the registry from the config file
    Reload,

    /// Write a starter config file
    GenerateConfig {
        /// Output path (default: the active config path)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Recent patch executions
    History {
        /// Only this patch
        #[arg(long)]
        patch: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum CounterAction {
    /// Report cached vs. actual counters for one entity
    Check { kind: EntityKind, id: i64 },

    /// Resynchronize one entity's counters
    Fix { kind: EntityKind, id: i64 },

    /// Check every entity of a kind
    Scan {
        kind: EntityKind,

        /// Repair discrepancies while scanning
        #[arg(long)]
        fix: bool,

        /// Worst offenders to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

/// Resolved paths and settings shared by every handler
pub struct CliContext {
    pub env: EnvConfig,
    pub config_path: PathBuf,
    pub config: StockrxConfig,
    pub db_path: PathBuf,
    pub json: bool,
}

impl CliContext {
    pub fn new(cli: &Cli, env: EnvConfig) -> Self {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| env.data_dir().join("config.toml"));
        let config = StockrxConfig::load(&config_path);
        let db_path = get_db_path(cli.db.as_deref(), &config, &env);

        Self {
            env,
            config_path,
            config,
            db_path,
            json: cli.json,
        }
    }

    pub async fn open_pool(&self) -> anyhow::Result<Arc<DatabasePool>> {
        Ok(Arc::new(DatabasePool::open(&self.db_path).await?))
    }
}

/// Database path: --db / STOCKRX_DB, then [database] path, then the data dir.
pub fn get_db_path(
    flag: Option<&std::path::Path>,
    config: &StockrxConfig,
    env: &EnvConfig,
) -> PathBuf {
    flag.map(PathBuf::from)
        .or_else(|| config.database.path.clone())
        .unwrap_or_else(|| env.data_dir().join("stockrx.db"))
}

/// Print `value` as pretty JSON on stdout
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
