//! Health check status and result types.
//!
//! This module provides:
//! - `HealthStatus` enum representing probe health states
//! - `HealthCheckResult` struct for individual probe outcomes
//! - `HealthSummary` and `SystemStatus` for aggregated views
//!
//! # Health Status Semantics
//!
//! - **Healthy**: the dependency is fully operational
//! - **Warning**: the dependency is operational but requires attention
//! - **Unhealthy**: the dependency is not operational
//!
//! # Example
//!
//! ```rust,ignore
//! use vitals_core::check::{HealthStatus, HealthCheckResult};
//!
//! let result = HealthCheckResult::healthy("database")
//!     .with_response_time_ms(5.2)
//!     .with_metadata("pool_size", 10u32);
//! assert!(result.is_healthy());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{ErrorCode, VitalsError};

// ═══════════════════════════════════════════════════════════════════════════════
// Health Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Health status of a single probe or the aggregate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The dependency is operating normally
    Healthy,
    /// The dependency is operational but showing signs of potential issues
    Warning,
    /// The dependency is not operational or has critical issues
    Unhealthy,
}

impl HealthStatus {
    /// Severity level, higher is worse.
    pub const fn severity(&self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Warning => 1,
            Self::Unhealthy => 2,
        }
    }

    /// Check if the status is healthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if this status is worse than another.
    pub fn is_worse_than(&self, other: Self) -> bool {
        self.severity() > other.severity()
    }

    /// Check if this status is better than another.
    pub fn is_better_than(&self, other: Self) -> bool {
        self.severity() < other.severity()
    }

    /// Combine two statuses, keeping the worse one.
    pub fn combine(self, other: Self) -> Self {
        if other.is_worse_than(self) {
            other
        } else {
            self
        }
    }

    /// Reduce a set of statuses to the most severe member.
    ///
    /// An empty input yields `Healthy`.
    pub fn most_severe<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        statuses
            .into_iter()
            .fold(Self::Healthy, |acc, status| acc.combine(status))
    }

    /// HTTP status code associated with this health status.
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Healthy => 200,
            Self::Warning => 429,
            Self::Unhealthy => 503,
        }
    }

    /// Human-readable display name.
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::Warning => "Warning",
            Self::Unhealthy => "Unhealthy",
        }
    }

    /// Description of what the status means.
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Healthy => "The service is operating normally",
            Self::Warning => "The service is operational but requires attention",
            Self::Unhealthy => "The service is not operational or has critical issues",
        }
    }

    /// Terminal marker for tabular output.
    pub const fn marker(&self) -> &'static str {
        match self {
            Self::Healthy => "✓",
            Self::Warning => "⚠",
            Self::Unhealthy => "✗",
        }
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::Healthy
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = VitalsError;

    /// Parse a status from a case-insensitive alias.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "healthy" | "ok" | "success" | "up" => Ok(Self::Healthy),
            "warning" | "warn" | "degraded" => Ok(Self::Warning),
            "unhealthy" | "error" | "failed" | "down" => Ok(Self::Unhealthy),
            _ => Err(VitalsError::new(
                ErrorCode::InvalidValue,
                format!("Invalid health status: {value}"),
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check Result
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable outcome of one probe execution.
///
/// Metadata values go through `serde_json::to_value`, so only serializable
/// data can be stored; anything else is dropped at the builder boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Name of the probe that produced this result
    pub name: String,

    /// Status of the probe
    pub status: HealthStatus,

    /// Wall-clock duration of the probe invocation in milliseconds
    pub response_time_ms: f64,

    /// Additional metadata about the check
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Optional note, set on warnings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Failure cause, set on unhealthy results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the check was performed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
}

impl HealthCheckResult {
    /// Create a result with an explicit status.
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            response_time_ms: 0.0,
            metadata: BTreeMap::new(),
            message: None,
            error: None,
            checked_at: Some(Utc::now()),
        }
    }

    /// Create a healthy result.
    pub fn healthy(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Healthy)
    }

    /// Create a warning result.
    pub fn warning(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Warning)
    }

    /// Create an unhealthy result.
    pub fn unhealthy(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Unhealthy)
    }

    /// Set the response time from a `Duration`.
    pub fn with_response_time(self, elapsed: Duration) -> Self {
        self.with_response_time_ms(elapsed.as_secs_f64() * 1000.0)
    }

    /// Set the response time in milliseconds, rounded to two decimals.
    pub fn with_response_time_ms(mut self, ms: f64) -> Self {
        self.response_time_ms = (ms.max(0.0) * 100.0).round() / 100.0;
        self
    }

    /// Attach a metadata entry. Values that fail to serialize are dropped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }

    /// Merge a pre-built metadata map.
    pub fn with_metadata_map(mut self, map: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata.extend(map);
        self
    }

    /// Attach a human-readable note.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach a failure cause. Forces the status to `Unhealthy`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.status = HealthStatus::Unhealthy;
        self.error = Some(error.into());
        self
    }

    /// Check if the result is healthy.
    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Check if the result carries a warning.
    pub fn has_warning(&self) -> bool {
        self.status == HealthStatus::Warning
    }

    /// Check if the result is unhealthy.
    pub fn is_unhealthy(&self) -> bool {
        self.status == HealthStatus::Unhealthy
    }

    /// Check if the result carries an error string.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

impl std::fmt::Display for HealthCheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({:.2}ms)",
            self.name,
            self.status.display_name().to_uppercase(),
            self.response_time_ms
        )?;
        if let Some(ref error) = self.error {
            write!(f, " - {error}")?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Summary and System Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Summary counts over a set of results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    /// Total number of checks
    pub total_checks: usize,
    /// Number of healthy checks
    pub healthy_checks: usize,
    /// Number of checks with warnings
    pub warning_checks: usize,
    /// Number of unhealthy checks
    pub unhealthy_checks: usize,
}

impl HealthSummary {
    /// Tally a set of results.
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a HealthCheckResult>,
    {
        let mut summary = Self::default();
        for result in results {
            summary.total_checks += 1;
            match result.status {
                HealthStatus::Healthy => summary.healthy_checks += 1,
                HealthStatus::Warning => summary.warning_checks += 1,
                HealthStatus::Unhealthy => summary.unhealthy_checks += 1,
            }
        }
        summary
    }
}

/// Derived read-only view over a result set.
///
/// The top-level `status` is binary: `healthy` only when every check is
/// healthy, `unhealthy` otherwise (warnings included). The three-valued
/// aggregate is available via `aggregate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Binary overall status string (`healthy` / `unhealthy`)
    pub status: String,

    /// Most severe status across all checks
    pub aggregate: HealthStatus,

    /// When this view was generated
    pub timestamp: DateTime<Utc>,

    /// Per-check results keyed by probe name
    pub checks: BTreeMap<String, HealthCheckResult>,

    /// Summary counts
    pub meta: HealthSummary,
}

impl SystemStatus {
    /// Build a system status view from a result map.
    pub fn from_results(checks: BTreeMap<String, HealthCheckResult>) -> Self {
        let all_healthy = checks.values().all(HealthCheckResult::is_healthy);
        let aggregate = HealthStatus::most_severe(checks.values().map(|r| r.status));
        let meta = HealthSummary::from_results(checks.values());

        Self {
            status: if all_healthy {
                HealthStatus::Healthy.to_string()
            } else {
                HealthStatus::Unhealthy.to_string()
            },
            aggregate,
            timestamp: Utc::now(),
            checks,
            meta,
        }
    }

    /// Check if every underlying result is healthy.
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy.to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_severity_ordering() {
        assert!(HealthStatus::Healthy.severity() < HealthStatus::Warning.severity());
        assert!(HealthStatus::Warning.severity() < HealthStatus::Unhealthy.severity());
        assert!(HealthStatus::Unhealthy.is_worse_than(HealthStatus::Warning));
        assert!(HealthStatus::Healthy.is_better_than(HealthStatus::Warning));
        assert!(!HealthStatus::Warning.is_worse_than(HealthStatus::Warning));
    }

    #[test]
    fn test_most_severe_picks_worst_member() {
        let pairs = [
            (HealthStatus::Healthy, HealthStatus::Warning),
            (HealthStatus::Warning, HealthStatus::Unhealthy),
            (HealthStatus::Healthy, HealthStatus::Unhealthy),
        ];
        for (a, b) in pairs {
            let expected = if a.severity() >= b.severity() { a } else { b };
            assert_eq!(HealthStatus::most_severe([a, b]), expected);
            assert_eq!(HealthStatus::most_severe([b, a]), expected);
        }
    }

    #[test]
    fn test_most_severe_empty_is_healthy() {
        assert_eq!(HealthStatus::most_severe([]), HealthStatus::Healthy);
    }

    #[test]
    fn test_from_str_aliases() {
        for alias in ["healthy", "OK", "success", "up"] {
            assert_eq!(HealthStatus::from_str(alias).unwrap(), HealthStatus::Healthy);
        }
        for alias in ["warning", "warn", "Degraded"] {
            assert_eq!(HealthStatus::from_str(alias).unwrap(), HealthStatus::Warning);
        }
        for alias in ["unhealthy", "error", "failed", "DOWN"] {
            assert_eq!(
                HealthStatus::from_str(alias).unwrap(),
                HealthStatus::Unhealthy
            );
        }
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = HealthStatus::from_str("flourishing").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidValue);
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(HealthStatus::Healthy.http_status_code(), 200);
        assert_eq!(HealthStatus::Warning.http_status_code(), 429);
        assert_eq!(HealthStatus::Unhealthy.http_status_code(), 503);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        let status: HealthStatus = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(status, HealthStatus::Warning);
    }

    #[test]
    fn test_result_builders() {
        let result = HealthCheckResult::healthy("database")
            .with_response_time_ms(12.345)
            .with_metadata("pool_size", 10u32)
            .with_message("Connected");

        assert!(result.is_healthy());
        assert_eq!(result.response_time_ms, 12.35);
        assert_eq!(result.metadata["pool_size"], serde_json::json!(10));
        assert!(result.checked_at.is_some());
    }

    #[test]
    fn test_with_error_forces_unhealthy() {
        let result = HealthCheckResult::healthy("redis").with_error("connection refused");
        assert!(result.is_unhealthy());
        assert!(result.has_error());
    }

    #[test]
    fn test_negative_response_time_clamped() {
        let result = HealthCheckResult::healthy("x").with_response_time_ms(-3.0);
        assert_eq!(result.response_time_ms, 0.0);
    }

    #[test]
    fn test_result_display() {
        let result = HealthCheckResult::unhealthy("kafka")
            .with_response_time_ms(8.0)
            .with_error("no brokers");
        let rendered = result.to_string();
        assert!(rendered.contains("kafka: UNHEALTHY"));
        assert!(rendered.contains("no brokers"));
    }

    #[test]
    fn test_result_roundtrip_serialization() {
        let result = HealthCheckResult::warning("s3")
            .with_response_time_ms(42.0)
            .with_message("size above threshold")
            .with_metadata("size_bytes", 123u64);

        let json = serde_json::to_string(&result).unwrap();
        let back: HealthCheckResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "s3");
        assert_eq!(back.status, HealthStatus::Warning);
        assert_eq!(back.response_time_ms, 42.0);
        assert_eq!(back.metadata["size_bytes"], serde_json::json!(123));
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            HealthCheckResult::healthy("a"),
            HealthCheckResult::healthy("b"),
            HealthCheckResult::warning("c"),
            HealthCheckResult::unhealthy("d"),
        ];
        let summary = HealthSummary::from_results(&results);
        assert_eq!(summary.total_checks, 4);
        assert_eq!(summary.healthy_checks, 2);
        assert_eq!(summary.warning_checks, 1);
        assert_eq!(summary.unhealthy_checks, 1);
    }

    #[test]
    fn test_system_status_binary_rule() {
        let mut checks = BTreeMap::new();
        checks.insert("a".to_string(), HealthCheckResult::healthy("a"));
        checks.insert("b".to_string(), HealthCheckResult::warning("b"));

        let status = SystemStatus::from_results(checks);
        // A warning flips the binary status but not the aggregate to unhealthy.
        assert_eq!(status.status, "unhealthy");
        assert_eq!(status.aggregate, HealthStatus::Warning);
        assert!(!status.is_healthy());
    }

    #[test]
    fn test_system_status_all_healthy() {
        let mut checks = BTreeMap::new();
        checks.insert("a".to_string(), HealthCheckResult::healthy("a"));

        let status = SystemStatus::from_results(checks);
        assert_eq!(status.status, "healthy");
        assert!(status.is_healthy());
        assert_eq!(status.meta.total_checks, 1);
    }
}
