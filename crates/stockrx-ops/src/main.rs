// crates/stockrx-ops/src/main.rs
// StockRx maintenance CLI

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, CliContext, Commands};
use stockrx::config::EnvConfig;
use tracing::{Level, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then project - project overrides)
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".stockrx/.env"));
    }
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let env = EnvConfig::load();

    // Quiet by default: reports go to stdout, logs to stderr
    let log_level = match cli.verbose {
        0 => env.level().unwrap_or(Level::WARN),
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut validation = env.validate();
    let ctx = CliContext::new(&cli, env);
    validation.merge(ctx.config.validate());
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    for error in &validation.errors {
        warn!("Config: {}", error);
    }

    match cli.command {
        Commands::Patch { action } => cli::patch::run(&ctx, action).await,
        Commands::Counters { action } => cli::counters::run(&ctx, action).await,
    }
}
