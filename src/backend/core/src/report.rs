//! Result reporters.
//!
//! Pure projections of a result map into human and machine formats: a table
//! with a pass/warn/fail summary, a JSON envelope, and Prometheus exposition
//! text. Shared by the CLI and the HTTP surface.

use chrono::Utc;
use colored::Colorize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::OnceLock;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

use crate::check::{HealthCheckResult, HealthStatus, HealthSummary};

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable table with summary
    #[default]
    Table,
    /// JSON envelope
    Json,
    /// Prometheus exposition text
    Prometheus,
}

/// Render a result map in the requested format.
pub fn render(format: ReportFormat, results: &BTreeMap<String, HealthCheckResult>) -> String {
    match format {
        ReportFormat::Table => render_table(results),
        ReportFormat::Json => {
            serde_json::to_string_pretty(&render_json(results)).unwrap_or_default()
        }
        ReportFormat::Prometheus => render_prometheus(results),
    }
}

/// Process exit code for a result set: zero only when there is at least one
/// result and every result is healthy.
pub fn exit_code(results: &BTreeMap<String, HealthCheckResult>) -> i32 {
    if !results.is_empty() && results.values().all(HealthCheckResult::is_healthy) {
        0
    } else {
        1
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Table
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Check")]
    check: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Response Time")]
    response_time: String,
    #[tabled(rename = "Message")]
    message: String,
}

fn status_cell(status: HealthStatus) -> String {
    let label = format!("{} {}", status.marker(), status.display_name());
    match status {
        HealthStatus::Healthy => label.green().to_string(),
        HealthStatus::Warning => label.yellow().to_string(),
        HealthStatus::Unhealthy => label.red().to_string(),
    }
}

/// Render a tabular human view with a summary block.
pub fn render_table(results: &BTreeMap<String, HealthCheckResult>) -> String {
    if results.is_empty() {
        return "No health checks configured!".red().to_string();
    }

    let rows: Vec<CheckRow> = results
        .values()
        .map(|result| CheckRow {
            check: result.name.clone(),
            status: status_cell(result.status),
            response_time: format!("{:.2}ms", result.response_time_ms),
            message: result
                .error
                .clone()
                .or_else(|| result.message.clone())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::first()).with(Alignment::left()))
        .to_string();

    let summary = HealthSummary::from_results(results.values());
    let mut out = table;
    out.push_str("\n\nSummary:\n");
    let _ = writeln!(out, "Total Checks: {}", summary.total_checks);
    let _ = writeln!(out, "{} Healthy: {}", "✓".green(), summary.healthy_checks);
    if summary.warning_checks > 0 {
        let _ = writeln!(out, "{} Warnings: {}", "⚠".yellow(), summary.warning_checks);
    }
    if summary.unhealthy_checks > 0 {
        let _ = writeln!(out, "{} Failed: {}", "✗".red(), summary.unhealthy_checks);
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON envelope: `{status, timestamp, checks, meta}`.
pub fn render_json(results: &BTreeMap<String, HealthCheckResult>) -> serde_json::Value {
    let all_healthy = !results.is_empty() && results.values().all(HealthCheckResult::is_healthy);
    serde_json::json!({
        "status": if all_healthy { "healthy" } else { "unhealthy" },
        "timestamp": Utc::now().to_rfc3339(),
        "checks": results,
        "meta": HealthSummary::from_results(results.values()),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Prometheus
// ═══════════════════════════════════════════════════════════════════════════════

/// Sanitize a probe name into a Prometheus-safe label value.
pub fn sanitize_metric_name(name: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_]").expect("static pattern"));
    pattern.replace_all(name, "_").to_lowercase()
}

/// Render Prometheus exposition text with one gauge pair per check.
pub fn render_prometheus(results: &BTreeMap<String, HealthCheckResult>) -> String {
    let mut out = String::new();
    for result in results.values() {
        let check = sanitize_metric_name(&result.name);
        let _ = writeln!(
            out,
            "# HELP health_check_status Status of {check} health check"
        );
        let _ = writeln!(out, "# TYPE health_check_status gauge");
        let _ = writeln!(
            out,
            "health_check_status{{check=\"{check}\"}} {}",
            if result.is_healthy() { 1 } else { 0 }
        );
        let _ = writeln!(
            out,
            "# HELP health_check_response_time_ms Response time of {check} health check"
        );
        let _ = writeln!(out, "# TYPE health_check_response_time_ms gauge");
        let _ = writeln!(
            out,
            "health_check_response_time_ms{{check=\"{check}\"}} {:.2}",
            result.response_time_ms
        );
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn results(pairs: &[(&str, HealthStatus)]) -> BTreeMap<String, HealthCheckResult> {
        pairs
            .iter()
            .map(|(name, status)| {
                (
                    name.to_string(),
                    HealthCheckResult::new(*name, *status).with_response_time_ms(12.5),
                )
            })
            .collect()
    }

    #[test]
    fn test_exit_code_all_healthy() {
        let map = results(&[("a", HealthStatus::Healthy), ("b", HealthStatus::Healthy)]);
        assert_eq!(exit_code(&map), 0);
    }

    #[test]
    fn test_exit_code_warning_is_failure() {
        let map = results(&[("a", HealthStatus::Healthy), ("b", HealthStatus::Warning)]);
        assert_eq!(exit_code(&map), 1);
    }

    #[test]
    fn test_exit_code_empty_is_failure() {
        assert_eq!(exit_code(&BTreeMap::new()), 1);
    }

    #[test]
    fn test_json_envelope_status() {
        let map = results(&[("a", HealthStatus::Healthy)]);
        let json = render_json(&map);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["meta"]["total_checks"], 1);

        let map = results(&[("a", HealthStatus::Unhealthy)]);
        let json = render_json(&map);
        assert_eq!(json["status"], "unhealthy");
        assert!(json["checks"]["a"]["status"] == "unhealthy");
    }

    #[test]
    fn test_sanitize_metric_name() {
        assert_eq!(sanitize_metric_name("My-Check.1"), "my_check_1");
        assert_eq!(sanitize_metric_name("database"), "database");
        assert_eq!(sanitize_metric_name("auth api"), "auth_api");
    }

    #[test]
    fn test_prometheus_output_shape() {
        let map = results(&[("database", HealthStatus::Healthy)]);
        let text = render_prometheus(&map);
        assert!(text.contains("# TYPE health_check_status gauge"));
        assert!(text.contains("health_check_status{check=\"database\"} 1"));
        assert!(text.contains("health_check_response_time_ms{check=\"database\"} 12.50"));
    }

    #[test]
    fn test_prometheus_unhealthy_is_zero() {
        let map = results(&[("kafka", HealthStatus::Unhealthy)]);
        let text = render_prometheus(&map);
        assert!(text.contains("health_check_status{check=\"kafka\"} 0"));
    }

    #[test]
    fn test_table_contains_rows_and_summary() {
        colored::control::set_override(false);
        let map = results(&[("a", HealthStatus::Healthy), ("b", HealthStatus::Unhealthy)]);
        let table = render_table(&map);
        assert!(table.contains("Check"));
        assert!(table.contains("Total Checks: 2"));
        assert!(table.contains("Failed: 1"));
    }

    #[test]
    fn test_table_empty() {
        colored::control::set_override(false);
        let table = render_table(&BTreeMap::new());
        assert!(table.contains("No health checks configured"));
    }
}
