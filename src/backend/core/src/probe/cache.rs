//! Cache (Redis-like) health probe.
//!
//! Pings the server, gathers memory/client/hit-rate metrics, classifies
//! memory usage and round-trip latency against thresholds, and validates
//! read-write correctness with a live set/get/delete cycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

use crate::check::{HealthCheckResult, HealthStatus};
use crate::error::Result;
use crate::probe::{HealthCheck, Thresholds};

/// Default memory usage thresholds (percent).
const DEFAULT_MEMORY_THRESHOLDS: Thresholds = Thresholds::new(75.0, 90.0);

/// Default round-trip latency thresholds (milliseconds).
const DEFAULT_RESPONSE_THRESHOLDS: Thresholds = Thresholds::new(100.0, 200.0);

// ═══════════════════════════════════════════════════════════════════════════════
// Connector
// ═══════════════════════════════════════════════════════════════════════════════

/// Server-side metrics reported by a cache connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheServerInfo {
    /// Server version string
    pub version: String,
    /// Server uptime in seconds
    pub uptime_secs: u64,
    /// Currently connected clients
    pub connected_clients: u64,
    /// Memory in use, bytes
    pub used_memory_bytes: u64,
    /// Configured memory limit, bytes; 0 when unlimited
    pub max_memory_bytes: u64,
    /// Keys evicted since start
    pub evicted_keys: u64,
    /// Keyspace hits since start
    pub keyspace_hits: u64,
    /// Keyspace misses since start
    pub keyspace_misses: u64,
    /// Instantaneous operations per second
    pub ops_per_sec: u64,
}

impl CacheServerInfo {
    /// Memory usage percentage, `None` when no limit is configured.
    pub fn memory_usage_percent(&self) -> Option<f64> {
        if self.max_memory_bytes == 0 {
            return None;
        }
        Some((self.used_memory_bytes as f64 / self.max_memory_bytes as f64) * 100.0)
    }

    /// Keyspace hit rate percentage over the server lifetime.
    pub fn hit_rate_percent(&self) -> f64 {
        let total = self.keyspace_hits + self.keyspace_misses;
        if total == 0 {
            return 0.0;
        }
        (self.keyspace_hits as f64 / total as f64) * 100.0
    }
}

/// Narrow capability set the cache probe needs from its client.
#[async_trait]
pub trait CacheConnector: Send + Sync {
    /// Ping the server.
    async fn ping(&self) -> Result<()>;

    /// Gather server metrics.
    async fn server_info(&self) -> Result<CacheServerInfo>;

    /// Store a value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete a value.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Production connector backed by a `redis` client.
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    /// Wrap a redis client.
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn info_field(info: &str, field: &str) -> Option<u64> {
        info.lines()
            .find(|line| line.starts_with(field) && line.as_bytes().get(field.len()) == Some(&b':'))
            .and_then(|line| line.split(':').nth(1))
            .and_then(|v| v.trim().parse().ok())
    }
}

#[async_trait]
impl CacheConnector for RedisConnector {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(crate::error::VitalsError::internal(format!(
                "Unexpected PING response: {pong}"
            )));
        }
        Ok(())
    }

    async fn server_info(&self) -> Result<CacheServerInfo> {
        let mut conn = self.connection().await?;
        let info: String = redis::cmd("INFO").query_async(&mut conn).await?;

        let version = info
            .lines()
            .find(|line| line.starts_with("redis_version:"))
            .and_then(|line| line.split(':').nth(1))
            .unwrap_or("unknown")
            .trim()
            .to_string();

        Ok(CacheServerInfo {
            version,
            uptime_secs: Self::info_field(&info, "uptime_in_seconds").unwrap_or(0),
            connected_clients: Self::info_field(&info, "connected_clients").unwrap_or(0),
            used_memory_bytes: Self::info_field(&info, "used_memory").unwrap_or(0),
            max_memory_bytes: Self::info_field(&info, "maxmemory").unwrap_or(0),
            evicted_keys: Self::info_field(&info, "evicted_keys").unwrap_or(0),
            keyspace_hits: Self::info_field(&info, "keyspace_hits").unwrap_or(0),
            keyspace_misses: Self::info_field(&info, "keyspace_misses").unwrap_or(0),
            ops_per_sec: Self::info_field(&info, "instantaneous_ops_per_sec").unwrap_or(0),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Probe
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for the cache probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheProbeConfig {
    /// Whether the probe runs at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether a failure gates readiness
    #[serde(default = "default_critical")]
    pub critical: bool,

    /// Execution budget
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Memory usage thresholds (percent)
    #[serde(default = "default_memory_thresholds")]
    pub memory_thresholds: Thresholds,

    /// Round-trip latency thresholds (milliseconds)
    #[serde(default = "default_response_thresholds")]
    pub response_thresholds: Thresholds,
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
fn default_memory_thresholds() -> Thresholds {
    DEFAULT_MEMORY_THRESHOLDS
}
fn default_response_thresholds() -> Thresholds {
    DEFAULT_RESPONSE_THRESHOLDS
}

impl Default for CacheProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            critical: true,
            timeout: default_timeout(),
            memory_thresholds: DEFAULT_MEMORY_THRESHOLDS,
            response_thresholds: DEFAULT_RESPONSE_THRESHOLDS,
        }
    }
}

/// Cache health probe.
pub struct CacheProbe {
    connector: Arc<dyn CacheConnector>,
    config: CacheProbeConfig,
}

impl CacheProbe {
    /// Create a probe over a connector.
    pub fn new(connector: Arc<dyn CacheConnector>, config: CacheProbeConfig) -> Self {
        Self { connector, config }
    }

    fn info_metadata(result: HealthCheckResult, info: &CacheServerInfo) -> HealthCheckResult {
        let mut result = result
            .with_metadata("version", &info.version)
            .with_metadata("uptime_days", (info.uptime_secs as f64 / 86_400.0 * 10.0).round() / 10.0)
            .with_metadata("connected_clients", info.connected_clients)
            .with_metadata("used_memory_bytes", info.used_memory_bytes)
            .with_metadata("evicted_keys", info.evicted_keys)
            .with_metadata("hit_rate_percent", (info.hit_rate_percent() * 100.0).round() / 100.0)
            .with_metadata("ops_per_second", info.ops_per_sec);
        if let Some(usage) = info.memory_usage_percent() {
            result = result.with_metadata("memory_usage_percent", (usage * 100.0).round() / 100.0);
        }
        result
    }

    /// Round-trip correctness test: write, read back, delete.
    async fn verify_read_write(&self) -> std::result::Result<(), String> {
        let key = format!("health:test:{}", Uuid::new_v4());
        let value = "test-value";

        self.connector
            .set(&key, value, Duration::from_secs(60))
            .await
            .map_err(|e| format!("Failed to write to cache: {e}"))?;

        let read = self
            .connector
            .get(&key)
            .await
            .map_err(|e| format!("Failed to read from cache: {e}"))?;
        if read.as_deref() != Some(value) {
            // Best-effort cleanup before reporting the mismatch.
            let _ = self.connector.delete(&key).await;
            return Err("Cache read verification failed".to_string());
        }

        self.connector
            .delete(&key)
            .await
            .map_err(|e| format!("Failed to delete from cache: {e}"))?;
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for CacheProbe {
    fn name(&self) -> &str {
        "redis"
    }

    fn display_name(&self) -> String {
        "Redis Server".to_string()
    }

    fn description(&self) -> String {
        "Checks cache server connectivity, memory usage, and performance".to_string()
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

    fn tags(&self) -> Vec<String> {
        vec!["core".into(), "cache".into(), "redis".into()]
    }

    async fn execute(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();

        if let Err(e) = self.connector.ping().await {
            return Ok(HealthCheckResult::unhealthy(self.name())
                .with_response_time(start.elapsed())
                .with_error(format!("Cache ping failed: {e}")));
        }

        let info = match self.connector.server_info().await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Failed to gather cache metrics");
                return Ok(HealthCheckResult::warning(self.name())
                    .with_response_time(start.elapsed())
                    .with_message("Some cache metrics unavailable")
                    .with_metadata("metrics_error", e.to_string()));
            }
        };

        let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        match self.config.response_thresholds.classify(response_time_ms) {
            HealthStatus::Healthy => {}
            HealthStatus::Warning => {
                let result = HealthCheckResult::warning(self.name())
                    .with_response_time_ms(response_time_ms)
                    .with_message("Response time exceeded warning threshold");
                return Ok(Self::info_metadata(result, &info));
            }
            HealthStatus::Unhealthy => {
                let result = HealthCheckResult::unhealthy(self.name())
                    .with_response_time_ms(response_time_ms)
                    .with_error("Response time exceeded error threshold");
                return Ok(Self::info_metadata(result, &info));
            }
        }

        if let Some(usage) = info.memory_usage_percent() {
            match self.config.memory_thresholds.classify(usage) {
                HealthStatus::Healthy => {}
                HealthStatus::Warning => {
                    let result = HealthCheckResult::warning(self.name())
                        .with_response_time(start.elapsed())
                        .with_message("Memory usage exceeded warning threshold");
                    return Ok(Self::info_metadata(result, &info));
                }
                HealthStatus::Unhealthy => {
                    let result = HealthCheckResult::unhealthy(self.name())
                        .with_response_time(start.elapsed())
                        .with_error("Memory usage exceeded error threshold");
                    return Ok(Self::info_metadata(result, &info));
                }
            }
        }

        if let Err(e) = self.verify_read_write().await {
            let result = HealthCheckResult::unhealthy(self.name())
                .with_response_time(start.elapsed())
                .with_error(e);
            return Ok(Self::info_metadata(result, &info));
        }

        let result = HealthCheckResult::healthy(self.name()).with_response_time(start.elapsed());
        Ok(Self::info_metadata(result, &info))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
