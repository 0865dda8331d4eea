//! Vitals CLI - run health checks from the command line.
//!
//! Builds the orchestrator locally from configuration and executes checks
//! directly, so it works without a running server and its exit code reflects
//! the outcome.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use vitals_core::bootstrap;
use vitals_core::config::Config;

/// Vitals - Health Check Orchestration CLI
#[derive(Parser)]
#[command(
    name = "vitals",
    version,
    about = "Vitals - health check orchestration engine",
    long_about = "Run, inspect, and export application health checks.",
    propagate_version = true
)]
pub struct Cli {
    /// Path to a configuration file
    #[arg(short, long, global = true, env = "VITALS_CONFIG")]
    config: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run health checks
    Check(commands::check::CheckArgs),

    /// Show the cached health status
    Status(commands::status::StatusArgs),

    /// List registered health checks
    List(commands::list::ListArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load().unwrap_or_else(|e| {
            output::print_info(&format!("Could not load config: {e}. Using defaults."));
            Config::default()
        }),
    };

    let orchestrator = bootstrap::build_orchestrator(&config).await?;
    let notifier = bootstrap::build_notifier(&config);

    let exit = match cli.command {
        Commands::Check(args) => commands::check::execute(args, &orchestrator, notifier).await?,
        Commands::Status(args) => commands::status::execute(args, &orchestrator).await?,
        Commands::List(args) => commands::list::execute(args, &orchestrator)?,
    };

    std::process::exit(exit);
}
