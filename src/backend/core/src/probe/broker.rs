//! Message broker (Kafka-like) health probe.
//!
//! Absence of configuration is degraded, not fatal: an unconfigured broker
//! probe reports a warning without touching the network. When configured it
//! verifies broker count, required topic accessibility, consumer-group lag
//! (watermarks computed per partition), and live produce delivery.
//!
//! The concrete broker client stays behind [`BrokerConnector`]; no client is
//! bundled, so the probe is constructed with an optional connector.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

use crate::check::HealthCheckResult;
use crate::error::Result;
use crate::probe::{HealthCheck, Thresholds};

/// Default consumer lag thresholds (messages).
const DEFAULT_LAG_THRESHOLDS: Thresholds = Thresholds::new(1000.0, 5000.0);

// ═══════════════════════════════════════════════════════════════════════════════
// Connector
// ═══════════════════════════════════════════════════════════════════════════════

/// One broker node as reported by cluster metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerInfo {
    /// Broker id
    pub id: i32,
    /// Advertised host
    pub host: String,
    /// Advertised port
    pub port: u16,
}

/// One topic as reported by cluster metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicInfo {
    /// Topic name
    pub name: String,
    /// Number of partitions
    pub partition_count: u32,
    /// Broker-reported topic error, if any
    pub error: Option<String>,
}

/// Cluster metadata snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerMetadata {
    /// Broker nodes
    pub brokers: Vec<BrokerInfo>,
    /// Known topics
    pub topics: Vec<TopicInfo>,
}

/// Watermark pair for one partition of a consumed topic.
///
/// Both watermarks are queried explicitly per partition; lag is always
/// derived from this pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionLag {
    /// Topic name
    pub topic: String,
    /// Partition index
    pub partition: i32,
    /// Low watermark offset
    pub low_watermark: i64,
    /// High watermark offset
    pub high_watermark: i64,
}

impl PartitionLag {
    /// Message lag for this partition, clamped at zero.
    pub fn lag(&self) -> i64 {
        (self.high_watermark - self.low_watermark).max(0)
    }
}

/// Narrow capability set the broker probe needs from its client.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Fetch cluster metadata.
    async fn fetch_metadata(&self) -> Result<BrokerMetadata>;

    /// Query per-partition watermarks for the consumed topics.
    async fn consumer_lag(&self, topics: &[String], group: &str) -> Result<Vec<PartitionLag>>;

    /// Produce a probe message and flush, bounded by the probe timeout.
    async fn produce_probe(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Probe
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for the broker probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerProbeConfig {
    /// Whether the probe runs at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether a failure gates readiness
    #[serde(default = "default_critical")]
    pub critical: bool,

    /// Execution budget
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Comma-separated broker list; empty means not configured
    #[serde(default)]
    pub brokers: String,

    /// Minimum broker count before warning
    #[serde(default = "default_min_brokers")]
    pub min_brokers: usize,

    /// Topics that must exist and be error-free
    #[serde(default)]
    pub required_topics: Vec<String>,

    /// Topics consumed by this application, used for lag checks
    #[serde(default)]
    pub consumer_topics: Vec<String>,

    /// Consumer group used for lag checks
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Consumer lag thresholds (messages)
    #[serde(default = "default_lag_thresholds")]
    pub lag_thresholds: Thresholds,

    /// Topic used for the live produce test
    #[serde(default = "default_test_topic")]
    pub test_topic: String,
}

fn default_enabled() -> bool {
    true
}
fn default_critical() -> bool {
    true
}
fn default_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_min_brokers() -> usize {
    1
}
fn default_consumer_group() -> String {
    "health-check-group".to_string()
}
fn default_lag_thresholds() -> Thresholds {
    DEFAULT_LAG_THRESHOLDS
}
fn default_test_topic() -> String {
    "health-check".to_string()
}

impl Default for BrokerProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            critical: true,
            timeout: default_timeout(),
            brokers: String::new(),
            min_brokers: 1,
            required_topics: Vec::new(),
            consumer_topics: Vec::new(),
            consumer_group: default_consumer_group(),
            lag_thresholds: DEFAULT_LAG_THRESHOLDS,
            test_topic: default_test_topic(),
        }
    }
}

/// Message broker health probe.
pub struct BrokerProbe {
    connector: Option<Arc<dyn BrokerConnector>>,
    config: BrokerProbeConfig,
}

impl BrokerProbe {
    /// Create a probe. A missing connector is treated the same as an empty
    /// broker list: the probe degrades to a warning without network calls.
    pub fn new(connector: Option<Arc<dyn BrokerConnector>>, config: BrokerProbeConfig) -> Self {
        Self { connector, config }
    }

    async fn check_consumer_lag(
        &self,
        connector: &Arc<dyn BrokerConnector>,
    ) -> std::result::Result<(i64, Vec<PartitionLag>), String> {
        let partitions = connector
            .consumer_lag(&self.config.consumer_topics, &self.config.consumer_group)
            .await
            .map_err(|e| e.to_string())?;
        let total = partitions.iter().map(PartitionLag::lag).sum();
        Ok((total, partitions))
    }
}

#[async_trait]
impl HealthCheck for BrokerProbe {
    fn name(&self) -> &str {
        "kafka"
    }

    fn display_name(&self) -> String {
        "Message Broker".to_string()
    }

    fn description(&self) -> String {
        "Checks broker connectivity, consumer groups, and producer functionality".to_string()
    }

    fn severity(&self) -> u8 {
        2
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

    fn minimum_interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn tags(&self) -> Vec<String> {
        vec!["messaging".into(), "kafka".into(), "core".into()]
    }

    async fn execute(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();

        if !self.config.enabled {
            return Ok(HealthCheckResult::warning(self.name())
                .with_response_time(start.elapsed())
                .with_message("Broker health check is disabled"));
        }

        // No brokers, no network: unconfigured is degraded, not fatal.
        let connector = match &self.connector {
            Some(connector) if !self.config.brokers.trim().is_empty() => connector,
            _ => {
                return Ok(HealthCheckResult::warning(self.name())
                    .with_response_time(start.elapsed())
                    .with_message("Message broker not configured"));
            }
        };

        let metadata = match connector.fetch_metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "Broker metadata fetch failed");
                return Ok(HealthCheckResult::warning(self.name())
                    .with_response_time(start.elapsed())
                    .with_message(format!("Broker check failed: {e}")));
            }
        };

        let broker_count = metadata.brokers.len();
        let topic_count = metadata.topics.len();

        if broker_count < self.config.min_brokers {
            return Ok(HealthCheckResult::warning(self.name())
                .with_response_time(start.elapsed())
                .with_message(format!(
                    "Insufficient broker count: {broker_count} (minimum required: {})",
                    self.config.min_brokers
                ))
                .with_metadata("broker_count", broker_count)
                .with_metadata("topic_count", topic_count));
        }

        let missing: Vec<&str> = self
            .config
            .required_topics
            .iter()
            .filter(|required| {
                !metadata
                    .topics
                    .iter()
                    .any(|t| &t.name == *required && t.error.is_none())
            })
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Ok(HealthCheckResult::warning(self.name())
                .with_response_time(start.elapsed())
                .with_message(format!(
                    "Required topics not accessible: {}",
                    missing.join(", ")
                ))
                .with_metadata("broker_count", broker_count)
                .with_metadata("missing_required_topics", &missing));
        }

        let mut result = HealthCheckResult::healthy(self.name())
            .with_metadata("broker_count", broker_count)
            .with_metadata("topic_count", topic_count)
            .with_metadata("consumer_enabled", !self.config.consumer_topics.is_empty());

        if !self.config.consumer_topics.is_empty() {
            match self.check_consumer_lag(connector).await {
                Ok((total_lag, partitions)) => {
                    result = result
                        .with_metadata("total_lag", total_lag)
                        .with_metadata("partitions", &partitions);
                    if total_lag as f64 >= self.config.lag_thresholds.error {
                        return Ok(HealthCheckResult::warning(self.name())
                            .with_response_time(start.elapsed())
                            .with_message(format!(
                                "High consumer lag detected: {total_lag} messages"
                            ))
                            .with_metadata("total_lag", total_lag)
                            .with_metadata("partitions", &partitions));
                    }
                    if total_lag as f64 >= self.config.lag_thresholds.warning {
                        return Ok(HealthCheckResult::warning(self.name())
                            .with_response_time(start.elapsed())
                            .with_message(format!("Consumer lag warning: {total_lag} messages"))
                            .with_metadata("total_lag", total_lag)
                            .with_metadata("partitions", &partitions));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to check consumer groups");
                    return Ok(HealthCheckResult::warning(self.name())
                        .with_response_time(start.elapsed())
                        .with_message(format!("Failed to check consumer groups: {e}"))
                        .with_metadata("broker_count", broker_count));
                }
            }
        }

        let payload = format!("health-check-{}", Uuid::new_v4());
        if let Err(e) = connector
            .produce_probe(&self.config.test_topic, payload.as_bytes())
            .await
        {
            return Ok(HealthCheckResult::unhealthy(self.name())
                .with_response_time(start.elapsed())
                .with_error(format!("Producer test failed: {e}"))
                .with_metadata("broker_count", broker_count));
        }

        Ok(result
            .with_metadata("producer_test", "passed")
            .with_response_time(start.elapsed()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
