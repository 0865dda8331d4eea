//! CLI subcommands.

pub mod check;
pub mod list;
pub mod status;

use clap::ValueEnum;
use vitals_core::report::ReportFormat;

/// Output format selection shared by subcommands.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum Format {
    /// Render as a formatted table
    #[default]
    Table,
    /// Render as JSON
    Json,
    /// Render as Prometheus exposition text
    Prometheus,
}

impl From<Format> for ReportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Table => Self::Table,
            Format::Json => Self::Json,
            Format::Prometheus => Self::Prometheus,
        }
    }
}
