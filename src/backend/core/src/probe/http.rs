//! HTTP endpoint health probe.
//!
//! Performs a GET against a configured URL and compares the response status
//! against an expected set. Transient failures degrade to a warning; once the
//! consecutive-failure threshold is reached the probe reports unhealthy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::check::{HealthCheckResult, HealthStatus};
use crate::error::Result;
use crate::probe::HealthCheck;

/// Configuration for an HTTP endpoint probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProbeConfig {
    /// Unique check name, e.g. `auth-api`
    pub name: String,

    /// Health endpoint URL
    pub url: String,

    /// Whether the probe runs at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether a failure gates readiness
    #[serde(default)]
    pub critical: bool,

    /// Execution budget
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Response statuses considered healthy
    #[serde(default = "default_expected_status")]
    pub expected_status: Vec<u16>,

    /// Consecutive failures before the probe turns unhealthy
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u64,
}

fn default_enabled() -> bool {
    true
}
fn default_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_expected_status() -> Vec<u16> {
    vec![200, 204]
}
fn default_failure_threshold() -> u64 {
    3
}

/// HTTP endpoint health probe.
pub struct HttpProbe {
    client: reqwest::Client,
    config: HttpProbeConfig,
    consecutive_failures: AtomicU64,
}

impl HttpProbe {
    /// Create a probe with its own HTTP client.
    pub fn new(config: HttpProbeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            consecutive_failures: AtomicU64::new(0),
        }
    }

    /// Create a probe reusing an existing client.
    pub fn with_client(client: reqwest::Client, config: HttpProbeConfig) -> Self {
        Self {
            client,
            config,
            consecutive_failures: AtomicU64::new(0),
        }
    }

    fn record_failure(&self) -> (u64, HealthStatus) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let status = if failures >= self.config.failure_threshold {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Warning
        };
        (failures, status)
    }
}

#[async_trait]
impl HealthCheck for HttpProbe {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn display_name(&self) -> String {
        format!("HTTP endpoint ({})", self.config.name)
    }

    fn description(&self) -> String {
        format!("Checks availability of {}", self.config.url)
    }

    fn is_critical(&self) -> bool {
        self.config.critical
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn tags(&self) -> Vec<String> {
        vec!["http".into(), "external".into()]
    }

    async fn execute(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();

        match self.client.get(&self.config.url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if self.config.expected_status.contains(&status) {
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    Ok(HealthCheckResult::healthy(self.name())
                        .with_response_time(start.elapsed())
                        .with_message(format!("{} is reachable", self.config.name))
                        .with_metadata("http_status", status)
                        .with_metadata("url", &self.config.url))
                } else {
                    let (failures, health) = self.record_failure();
                    let note = format!(
                        "Unexpected status: {status} (expected {:?})",
                        self.config.expected_status
                    );
                    let result = HealthCheckResult::new(self.name(), health)
                        .with_response_time(start.elapsed())
                        .with_metadata("http_status", status)
                        .with_metadata("consecutive_failures", failures);
                    Ok(match health {
                        HealthStatus::Unhealthy => result.with_error(note),
                        _ => result.with_message(note),
                    })
                }
            }
            Err(e) => {
                let (failures, health) = self.record_failure();
                warn!(
                    check = %self.config.name,
                    url = %self.config.url,
                    error = %e,
                    failures,
                    "HTTP health check request failed"
                );
                let note = format!("Request failed: {e}");
                let result = HealthCheckResult::new(self.name(), health)
                    .with_response_time(start.elapsed())
                    .with_metadata("url", &self.config.url)
                    .with_metadata("consecutive_failures", failures);
                Ok(match health {
                    HealthStatus::Unhealthy => result.with_error(note),
                    _ => result.with_message(note),
                })
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
