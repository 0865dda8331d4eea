//! Configuration management.
//!
//! Loaded from an optional file source plus `VITALS__`-prefixed environment
//! variables, e.g. `VITALS__HEALTH__CHECKS__DATABASE__ENABLED=false`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::orchestrator::OrchestratorConfig;
use crate::probe::{
    BrokerProbeConfig, CacheProbeConfig, DatabaseProbeConfig, HttpProbeConfig,
    ObjectStoreProbeConfig, SystemProbeConfig,
};

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis connection configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Health subsystem configuration
    #[serde(default)]
    pub health: HealthConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; the database probe is only registered when set
    pub url: Option<String>,

    /// Maximum number of pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Bucket checked by the object-store probe; unset leaves it unconfigured
    pub bucket: Option<String>,
}

/// Health subsystem configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthConfig {
    /// Orchestrator settings (result cache, callback budget)
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Result cache backend selection
    #[serde(default)]
    pub cache_store: CacheStoreKind,

    /// Per-probe configuration
    #[serde(default)]
    pub checks: ChecksConfig,

    /// Whether `/health/ping` also runs critical checks
    #[serde(default)]
    pub ping_check_critical: bool,

    /// Failure notification settings
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Background scheduler settings
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Which backend holds the cached result snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStoreKind {
    /// In-process memory store
    #[default]
    Memory,
    /// Shared Redis store
    Redis,
}

/// Per-probe configuration blocks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChecksConfig {
    /// Database probe
    #[serde(default)]
    pub database: DatabaseProbeConfig,

    /// Cache probe
    #[serde(default)]
    pub redis: CacheProbeConfig,

    /// Message broker probe
    #[serde(default)]
    pub kafka: BrokerProbeConfig,

    /// Object storage probe
    #[serde(default)]
    pub s3: ObjectStoreProbeConfig,

    /// System resource probe
    #[serde(default)]
    pub system: SystemProbeConfig,

    /// HTTP endpoint probes
    #[serde(default)]
    pub http: Vec<HttpProbeConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    /// Whether failure notifications are dispatched
    #[serde(default)]
    pub enabled: bool,

    /// Webhook destination for failure notifications
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Whether the background scheduler runs
    #[serde(default)]
    pub enabled: bool,

    /// Interval between scheduled runs
    #[serde(with = "humantime_serde", default = "default_schedule_interval")]
    pub interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_schedule_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON logs instead of pretty output
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_connections() -> u32 {
    20
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_schedule_interval() -> Duration {
    Duration::from_secs(60)
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logging() -> bool {
    true
}

impl Config {
    /// Load configuration from environment variables only.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("VITALS").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from a file, with environment variables taking precedence.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("VITALS").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
