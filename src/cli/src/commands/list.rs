//! List command: catalog of registered checks and their metadata.

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use std::sync::Arc;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use vitals_core::orchestrator::HealthOrchestrator;

use crate::output;

#[derive(Args)]
pub struct ListArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = ListFormat::Table)]
    pub format: ListFormat,
}

/// Catalog output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ListFormat {
    /// Render as a formatted table
    #[default]
    Table,
    /// Render as JSON
    Json,
    /// Render as YAML
    Yaml,
}

#[derive(Tabled)]
struct CheckListRow {
    #[tabled(rename = "Check")]
    name: String,
    #[tabled(rename = "Critical")]
    critical: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Timeout")]
    timeout: String,
    #[tabled(rename = "Tags")]
    tags: String,
    #[tabled(rename = "Depends On")]
    dependencies: String,
}

pub fn execute(args: ListArgs, orchestrator: &Arc<HealthOrchestrator>) -> Result<i32> {
    let descriptors = orchestrator.descriptors();
    if descriptors.is_empty() {
        output::print_error("No health checks configured!");
        return Ok(1);
    }

    match args.format {
        ListFormat::Table => {
            let rows: Vec<CheckListRow> = descriptors
                .iter()
                .map(|d| CheckListRow {
                    name: d.name.clone(),
                    critical: if d.is_critical {
                        "yes".red().to_string()
                    } else {
                        "no".into()
                    },
                    enabled: if d.enabled {
                        "yes".into()
                    } else {
                        "no".yellow().to_string()
                    },
                    timeout: format!("{}s", d.timeout_secs),
                    tags: d.tags.join(", "),
                    dependencies: if d.dependencies.is_empty() {
                        "-".into()
                    } else {
                        d.dependencies.join(", ")
                    },
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
        ListFormat::Json => println!("{}", serde_json::to_string_pretty(&descriptors)?),
        ListFormat::Yaml => print!("{}", serde_yaml::to_string(&descriptors)?),
    }

    Ok(0)
}
