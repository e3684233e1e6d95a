//! Rollcall CLI - inspect and reconcile event attendance.
//!
//! Reads a JSON seed file into the in-memory store, or connects to the
//! configured PostgreSQL store, and renders the dashboard views.

mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{events, reconcile, report};
use output::OutputFormat;
use rollcall_core::config::Config;
use rollcall_core::telemetry::{init_logging, LogFormat};

/// Rollcall - attendance reconciliation and reporting
#[derive(Parser)]
#[command(
    name = "rollcall",
    version,
    about = "Rollcall - attendance reconciliation and reporting",
    long_about = "CLI tool for viewing live occupancy, engagement and roster consistency of an event.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// JSON seed file with events, activities, participants and ledger
    #[arg(short, long, global = true, env = "ROLLCALL_SEED")]
    seed: Option<PathBuf>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "ROLLCALL_CONFIG")]
    config: Option<String>,

    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List events and mark the current one
    Events,

    /// Summary, locations, engagement and group breakdown
    Report(report::ReportArgs),

    /// Who is in each activity right now
    Occupancy(report::ReportArgs),

    /// Activities ranked by check-ins
    Engagement(report::EngagementArgs),

    /// Check that every roster location matches the ledger
    Verify(reconcile::ReconcileArgs),

    /// Repair roster locations from the ledger
    Reconcile(reconcile::ReconcileArgs),
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    config.logging.format = LogFormat::Compact;
    config.logging.include_location = false;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = run(cli).await;

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "rollcall_core=debug,info".to_string();
    } else {
        config.logging.level = "error".to_string();
    }
    init_logging(&config.logging)?;

    let store = context::open_store(cli.seed.as_deref(), &config).await?;
    let format = cli.output;

    match cli.command {
        Commands::Events => events::list(&store, format).await,
        Commands::Report(args) => report::report(args, &store, format).await,
        Commands::Occupancy(args) => report::occupancy(args, &store, format).await,
        Commands::Engagement(args) => report::engagement(args, &store, format).await,
        Commands::Verify(args) => reconcile::verify(args, &store, format).await,
        Commands::Reconcile(args) => reconcile::reconcile(args, &store, format).await,
    }
}
