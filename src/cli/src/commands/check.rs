//! Check command: run all, critical-only, or a single named check.

use anyhow::Result;
use clap::Args;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use vitals_core::notify::{failed_results, Notifier};
use vitals_core::orchestrator::HealthOrchestrator;
use vitals_core::report;

use super::Format;
use crate::output;

#[derive(Args)]
pub struct CheckArgs {
    /// Run exactly one named check
    pub check: Option<String>,

    /// Restrict to critical checks
    #[arg(long)]
    pub critical: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Clear cached results before running
    #[arg(long = "no-cache")]
    pub no_cache: bool,

    /// Dispatch failure notifications on completion
    #[arg(long)]
    pub notify: bool,

    /// Maximum execution time in seconds for the whole command
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

pub async fn execute(
    args: CheckArgs,
    orchestrator: &Arc<HealthOrchestrator>,
    notifier: Option<Arc<dyn Notifier>>,
) -> Result<i32> {
    if args.no_cache {
        orchestrator.clear_cache().await;
    }

    let budget = Duration::from_secs(args.timeout);
    let deadline = Instant::now() + budget;

    let run = async {
        if let Some(name) = &args.check {
            if !orchestrator.has_check(name) {
                return None;
            }
            match orchestrator.run_one(name).await {
                Ok(result) => {
                    let mut results = BTreeMap::new();
                    results.insert(result.name.clone(), result);
                    Some(results)
                }
                Err(e) => {
                    let mut results = BTreeMap::new();
                    results.insert(name.clone(), e.into_result(name));
                    Some(results)
                }
            }
        } else if args.critical {
            Some(orchestrator.run_critical().await)
        } else {
            Some(orchestrator.run_all_with_deadline(Some(deadline)).await)
        }
    };

    let results = match tokio::time::timeout(budget, run).await {
        Ok(Some(results)) => results,
        Ok(None) => {
            output::print_error(&format!(
                "Health check not found: {}",
                args.check.as_deref().unwrap_or_default()
            ));
            return Ok(1);
        }
        Err(_) => {
            output::print_error(&format!(
                "Health checks did not finish within {} seconds",
                args.timeout
            ));
            return Ok(1);
        }
    };

    if results.is_empty() {
        output::print_error("No health checks configured!");
        return Ok(1);
    }

    println!("{}", report::render(args.format.into(), &results));

    if args.notify {
        let failed = failed_results(&results);
        if !failed.is_empty() {
            match notifier {
                Some(notifier) => {
                    if let Err(e) = notifier.notify(&failed).await {
                        output::print_error(&format!("Failed to send notification: {e}"));
                    }
                }
                None => output::print_error("Notifications are not configured"),
            }
        }
    }

    Ok(report::exit_code(&results))
}
