//! Status command: show cached results without forcing a fresh run.

use anyhow::Result;
use clap::Args;
use std::sync::Arc;

use vitals_core::orchestrator::HealthOrchestrator;
use vitals_core::report;

use super::Format;
use crate::output;

#[derive(Args)]
pub struct StatusArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Table)]
    pub format: Format,
}

pub async fn execute(args: StatusArgs, orchestrator: &Arc<HealthOrchestrator>) -> Result<i32> {
    let results = orchestrator.cached_results().await;
    if results.is_empty() {
        output::print_error("No health checks configured!");
        return Ok(1);
    }

    println!("{}", report::render(args.format.into(), &results));
    Ok(report::exit_code(&results))
}
