//! Database health probe.
//!
//! Verifies basic connectivity with a trivial liveness query, measures query
//! latency, computes connection-pool usage against configurable thresholds,
//! and optionally checks replica lag. The concrete client sits behind
//! [`DatabaseConnector`]; production wiring uses a lazy `sqlx` Postgres pool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::check::{HealthCheckResult, HealthStatus};
use crate::error::Result;
use crate::probe::{HealthCheck, Thresholds};

/// Default thresholds for connection pool usage (percent).
const DEFAULT_CONNECTION_THRESHOLDS: Thresholds = Thresholds::new(70.0, 85.0);

/// Default thresholds for query round-trip time (milliseconds).
const DEFAULT_QUERY_TIME_THRESHOLDS: Thresholds = Thresholds::new(500.0, 1000.0);

/// Default replica lag warning level (seconds).
const DEFAULT_REPLICA_LAG_WARNING_SECS: f64 = 300.0;

// ═══════════════════════════════════════════════════════════════════════════════
// Connector
// ═══════════════════════════════════════════════════════════════════════════════

/// Connection pool statistics reported by a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Connections currently checked out
    pub active: u32,
    /// Idle connections held by the pool
    pub idle: u32,
    /// Pool capacity
    pub max: u32,
}

impl PoolStats {
    /// Pool usage as a percentage of capacity.
    pub fn usage_percent(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.active as f64 / self.max as f64) * 100.0
    }
}

/// Narrow capability set the database probe needs from its client.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    /// Issue a trivial liveness query.
    async fn ping(&self) -> Result<()>;

    /// Report connection pool statistics.
    async fn pool_stats(&self) -> Result<PoolStats>;

    /// Replica lag in seconds, `None` when not replicating.
    async fn replica_lag_secs(&self) -> Result<Option<f64>>;
}

/// Production connector backed by a `sqlx` Postgres pool.
pub struct SqlxDatabaseConnector {
    pool: PgPool,
    max_connections: u32,
}

impl SqlxDatabaseConnector {
    /// Wrap an existing pool. `max_connections` should match the pool's
    /// configured capacity.
    pub fn new(pool: PgPool, max_connections: u32) -> Self {
        Self {
            pool,
            max_connections,
        }
    }
}

#[async_trait]
impl DatabaseConnector for SqlxDatabaseConnector {
    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn pool_stats(&self) -> Result<PoolStats> {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;
        Ok(PoolStats {
            active: size.saturating_sub(idle),
            idle,
            max: self.max_connections,
        })
    }

    async fn replica_lag_secs(&self) -> Result<Option<f64>> {
        let lag: Option<f64> = sqlx::query_scalar(
            "SELECT EXTRACT(EPOCH FROM (now() - pg_last_xact_replay_timestamp()))::float8",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(lag)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Probe
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for the database probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseProbeConfig {
    /// Whether the probe runs at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether a failure gates readiness
    #[serde(default = "default_critical")]
    pub critical: bool,

    /// Execution budget
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Connection pool usage thresholds (percent)
    #[serde(default = "default_connection_thresholds")]
    pub connection_thresholds: Thresholds,

    /// Query round-trip thresholds (milliseconds)
    #[serde(default = "default_query_time_thresholds")]
    pub query_time_thresholds: Thresholds,

    /// Whether to check replica lag
    #[serde(default)]
    pub replication: bool,

    /// Replica lag warning level (seconds)
    #[serde(default = "default_replica_lag_warning")]
    pub replica_lag_warning_secs: f64,
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
fn default_connection_thresholds() -> Thresholds {
    DEFAULT_CONNECTION_THRESHOLDS
}
fn default_query_time_thresholds() -> Thresholds {
    DEFAULT_QUERY_TIME_THRESHOLDS
}
fn default_replica_lag_warning() -> f64 {
    DEFAULT_REPLICA_LAG_WARNING_SECS
}

impl Default for DatabaseProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            critical: true,
            timeout: default_timeout(),
            connection_thresholds: DEFAULT_CONNECTION_THRESHOLDS,
            query_time_thresholds: DEFAULT_QUERY_TIME_THRESHOLDS,
            replication: false,
            replica_lag_warning_secs: DEFAULT_REPLICA_LAG_WARNING_SECS,
        }
    }
}

/// Database health probe.
pub struct DatabaseProbe {
    connector: Arc<dyn DatabaseConnector>,
    config: DatabaseProbeConfig,
}

impl DatabaseProbe {
    /// Create a probe over a connector.
    pub fn new(connector: Arc<dyn DatabaseConnector>, config: DatabaseProbeConfig) -> Self {
        Self { connector, config }
    }

    fn pool_metadata(result: HealthCheckResult, stats: &PoolStats, usage: f64) -> HealthCheckResult {
        result
            .with_metadata("active_connections", stats.active)
            .with_metadata("idle_connections", stats.idle)
            .with_metadata("max_connections", stats.max)
            .with_metadata("connection_usage_percent", (usage * 100.0).round() / 100.0)
    }
}

#[async_trait]
impl HealthCheck for DatabaseProbe {
    fn name(&self) -> &str {
        "database"
    }

    fn display_name(&self) -> String {
        "Database Connection".to_string()
    }

    fn description(&self) -> String {
        "Checks database connectivity, performance, and status".to_string()
    }

    fn severity(&self) -> u8 {
        3
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
        vec!["core".into(), "database".into()]
    }

    async fn execute(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();

        // Basic connectivity first; nothing else is meaningful without it.
        if let Err(e) = self.connector.ping().await {
            return Ok(HealthCheckResult::unhealthy(self.name())
                .with_response_time(start.elapsed())
                .with_error(format!("Database connection failed: {e}")));
        }

        let stats = match self.connector.pool_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                return Ok(HealthCheckResult::unhealthy(self.name())
                    .with_response_time(start.elapsed())
                    .with_error(format!("Database check failed: {e}")));
            }
        };

        let usage = stats.usage_percent();
        debug!(
            active = stats.active,
            idle = stats.idle,
            max = stats.max,
            usage_percent = usage,
            "Database pool status"
        );

        match self.config.connection_thresholds.classify(usage) {
            HealthStatus::Healthy => {}
            HealthStatus::Warning => {
                let result = HealthCheckResult::warning(self.name())
                    .with_response_time(start.elapsed())
                    .with_message("Connection pool usage exceeded warning threshold");
                return Ok(Self::pool_metadata(result, &stats, usage)
                    .with_metadata("issue", "Connection pool threshold exceeded"));
            }
            HealthStatus::Unhealthy => {
                let result = HealthCheckResult::unhealthy(self.name())
                    .with_response_time(start.elapsed())
                    .with_error("Connection pool usage exceeded error threshold");
                return Ok(Self::pool_metadata(result, &stats, usage)
                    .with_metadata("issue", "Connection pool threshold exceeded"));
            }
        }

        // Second round trip, timed on its own, to watch query latency.
        let query_start = Instant::now();
        if let Err(e) = self.connector.ping().await {
            return Ok(HealthCheckResult::unhealthy(self.name())
                .with_response_time(start.elapsed())
                .with_error(format!("Query failed: {e}")));
        }
        let query_time_ms = query_start.elapsed().as_secs_f64() * 1000.0;

        match self.config.query_time_thresholds.classify(query_time_ms) {
            HealthStatus::Healthy => {}
            HealthStatus::Warning => {
                let result = HealthCheckResult::warning(self.name())
                    .with_response_time(start.elapsed())
                    .with_message("Query performance degraded")
                    .with_metadata("query_time_ms", (query_time_ms * 100.0).round() / 100.0);
                return Ok(Self::pool_metadata(result, &stats, usage));
            }
            HealthStatus::Unhealthy => {
                let result = HealthCheckResult::unhealthy(self.name())
                    .with_response_time(start.elapsed())
                    .with_error("Query time exceeded error threshold")
                    .with_metadata("query_time_ms", (query_time_ms * 100.0).round() / 100.0);
                return Ok(Self::pool_metadata(result, &stats, usage));
            }
        }

        let mut result = HealthCheckResult::healthy(self.name())
            .with_metadata("query_time_ms", (query_time_ms * 100.0).round() / 100.0);

        if self.config.replication {
            match self.connector.replica_lag_secs().await {
                Ok(Some(lag)) => {
                    result = result.with_metadata("seconds_behind_primary", lag);
                    if lag > self.config.replica_lag_warning_secs {
                        let warned = HealthCheckResult::warning(self.name())
                            .with_response_time(start.elapsed())
                            .with_message(format!(
                                "Replica lag {lag:.0}s exceeds {:.0}s",
                                self.config.replica_lag_warning_secs
                            ))
                            .with_metadata("seconds_behind_primary", lag)
                            .with_metadata("issue", "Replication issues detected");
                        return Ok(Self::pool_metadata(warned, &stats, usage));
                    }
                }
                Ok(None) => {
                    result = result.with_metadata("replication_active", false);
                }
                Err(e) => {
                    return Ok(HealthCheckResult::unhealthy(self.name())
                        .with_response_time(start.elapsed())
                        .with_error(format!("Replication check failed: {e}")));
                }
            }
        }

        Ok(Self::pool_metadata(result, &stats, usage).with_response_time(start.elapsed()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VitalsError;

    struct FakeConnector {
        ping_ok: bool,
        stats: PoolStats,
        lag: Option<f64>,
    }

    impl FakeConnector {
        fn healthy() -> Self {
            Self {
                ping_ok: true,
                stats: PoolStats {
                    active: 2,
                    idle: 8,
                    max: 10,
                },
                lag: None,
            }
        }
    }

    #[async_trait]
    impl DatabaseConnector for FakeConnector {
        async fn ping(&self) -> Result<()> {
            if self.ping_ok {
                Ok(())
            } else {
                Err(VitalsError::internal("connection refused"))
            }
        }

        async fn pool_stats(&self) -> Result<PoolStats> {
            Ok(self.stats)
        }

        async fn replica_lag_secs(&self) -> Result<Option<f64>> {
            Ok(self.lag)
        }
    }

    fn probe(connector: FakeConnector, config: DatabaseProbeConfig) -> DatabaseProbe {
        DatabaseProbe::new(Arc::new(connector), config)
    }

    #[test]
    fn test_pool_usage_percent() {
        let stats = PoolStats {
            active: 7,
            idle: 3,
            max: 10,
        };
        assert_eq!(stats.usage_percent(), 70.0);

        let empty = PoolStats {
            active: 0,
            idle: 0,
            max: 0,
        };
        assert_eq!(empty.usage_percent(), 0.0);
    }

    #[tokio::test]
    async fn test_healthy_database() {
        let result = probe(FakeConnector::healthy(), DatabaseProbeConfig::default())
            .execute()
            .await
            .unwrap();
        assert!(result.is_healthy());
        assert_eq!(
            result.metadata["connection_usage_percent"],
            serde_json::json!(20.0)
        );
        assert!(result.metadata.contains_key("query_time_ms"));
    }

    #[tokio::test]
    async fn test_ping_failure_is_unhealthy() {
        let connector = FakeConnector {
            ping_ok: false,
            ..FakeConnector::healthy()
        };
        let result = probe(connector, DatabaseProbeConfig::default())
            .execute()
            .await
            .unwrap();
        assert!(result.is_unhealthy());
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("Database connection failed"));
    }

    #[tokio::test]
    async fn test_pool_usage_above_error_threshold() {
        let connector = FakeConnector {
            stats: PoolStats {
                active: 19,
                idle: 1,
                max: 20,
            },
            ..FakeConnector::healthy()
        };
        let result = probe(connector, DatabaseProbeConfig::default())
            .execute()
            .await
            .unwrap();
        assert!(result.is_unhealthy());
        assert_eq!(
            result.metadata["connection_usage_percent"],
            serde_json::json!(95.0)
        );
    }

    #[tokio::test]
    async fn test_pool_usage_in_warning_band() {
        let connector = FakeConnector {
            stats: PoolStats {
                active: 15,
                idle: 5,
                max: 20,
            },
            ..FakeConnector::healthy()
        };
        let result = probe(connector, DatabaseProbeConfig::default())
            .execute()
            .await
            .unwrap();
        assert!(result.has_warning());
        assert_eq!(
            result.metadata["connection_usage_percent"],
            serde_json::json!(75.0)
        );
    }

    #[tokio::test]
    async fn test_replica_lag_warning() {
        let connector = FakeConnector {
            lag: Some(600.0),
            ..FakeConnector::healthy()
        };
        let config = DatabaseProbeConfig {
            replication: true,
            ..DatabaseProbeConfig::default()
        };
        let result = probe(connector, config).execute().await.unwrap();
        assert!(result.has_warning());
        assert_eq!(
            result.metadata["seconds_behind_primary"],
            serde_json::json!(600.0)
        );
    }

    #[tokio::test]
    async fn test_replica_lag_ignored_when_replication_disabled() {
        let connector = FakeConnector {
            lag: Some(600.0),
            ..FakeConnector::healthy()
        };
        let result = probe(connector, DatabaseProbeConfig::default())
            .execute()
            .await
            .unwrap();
        assert!(result.is_healthy());
    }

    #[test]
    fn test_probe_metadata_accessors() {
        let probe = probe(FakeConnector::healthy(), DatabaseProbeConfig::default());
        assert_eq!(probe.name(), "database");
        assert!(probe.is_critical());
        assert!(probe.is_enabled());
        assert_eq!(probe.timeout(), Duration::from_secs(5));
    }
}
