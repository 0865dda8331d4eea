//! Probe contract and implementations.
//!
//! A probe is a pluggable unit of monitoring logic for one external
//! dependency. Every variant implements [`HealthCheck`]; the orchestrator
//! only ever sees the trait. Concrete network clients sit behind narrow
//! connector traits defined in each variant module, so tests can substitute
//! fakes without touching probe logic.

mod broker;
mod cache;
mod database;
mod http;
mod object_store;
mod system;

pub use broker::{
    BrokerConnector, BrokerInfo, BrokerMetadata, BrokerProbe, BrokerProbeConfig, PartitionLag,
    TopicInfo,
};
pub use cache::{CacheConnector, CacheProbe, CacheProbeConfig, CacheServerInfo, RedisConnector};
pub use database::{
    DatabaseConnector, DatabaseProbe, DatabaseProbeConfig, PoolStats, SqlxDatabaseConnector,
};
pub use http::{HttpProbe, HttpProbeConfig};
pub use object_store::{
    ObjectStoreConnector, ObjectStoreProbe, ObjectStoreProbeConfig, S3Connector, StoreError,
    StoreMetrics,
};
pub use system::{SystemProbe, SystemProbeConfig};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::check::{HealthCheckResult, HealthStatus};
use crate::error::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Contract implemented by every probe.
///
/// Metadata accessors are queried on each run, never stored by the
/// orchestrator, so values like `is_enabled` may be config-driven and
/// dynamic. Probes are stateless strategy objects shared via `Arc` across
/// concurrent runs.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Unique identifier for the check.
    fn name(&self) -> &str;

    /// Human-readable name for display output.
    fn display_name(&self) -> String {
        self.name().to_string()
    }

    /// What the check monitors.
    fn description(&self) -> String {
        String::new()
    }

    /// Severity level of the check, higher is more critical.
    fn severity(&self) -> u8 {
        1
    }

    /// Whether a failure of this check flips overall readiness.
    fn is_critical(&self) -> bool {
        false
    }

    /// Execution budget for one run of this check.
    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// Whether the check should run at all.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Tags for grouping and filtering.
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Advisory minimum interval between scheduled executions.
    fn minimum_interval(&self) -> Duration {
        Duration::ZERO
    }

    /// Names of checks that must report healthy before this one runs.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Static configuration metadata, exposed by the docs endpoint.
    fn metadata(&self) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::new()
    }

    /// Execute the check.
    ///
    /// Implementations contain their own runtime failures and return an
    /// `Unhealthy` result; an `Err` is still converted to one by the
    /// orchestrator as a second containment layer.
    async fn execute(&self) -> Result<HealthCheckResult>;
}

/// Describes a registered check for catalogs and documentation output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDescriptor {
    /// Unique check name
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// What the check monitors
    pub description: String,
    /// Severity level
    pub severity: u8,
    /// Whether the check gates readiness
    pub is_critical: bool,
    /// Execution budget in seconds
    pub timeout_secs: u64,
    /// Whether the check is currently enabled
    pub enabled: bool,
    /// Grouping tags
    pub tags: Vec<String>,
    /// Advisory minimum interval in seconds
    pub minimum_interval_secs: u64,
    /// Upstream check names
    pub dependencies: Vec<String>,
}

impl CheckDescriptor {
    /// Build a descriptor by querying a probe's metadata accessors.
    pub fn describe(check: &dyn HealthCheck) -> Self {
        Self {
            name: check.name().to_string(),
            display_name: check.display_name(),
            description: check.description(),
            severity: check.severity(),
            is_critical: check.is_critical(),
            timeout_secs: check.timeout().as_secs(),
            enabled: check.is_enabled(),
            tags: check.tags(),
            minimum_interval_secs: check.minimum_interval().as_secs(),
            dependencies: check.dependencies(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Callback Checks
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of an ad-hoc callback check.
///
/// Callbacks may return either a plain pass/fail boolean or a full result.
pub enum CallbackOutcome {
    /// Plain boolean outcome; `false` becomes an `Unhealthy` result
    Passed(bool),
    /// Full result produced by the callback
    Result(HealthCheckResult),
}

impl From<bool> for CallbackOutcome {
    fn from(passed: bool) -> Self {
        Self::Passed(passed)
    }
}

impl From<HealthCheckResult> for CallbackOutcome {
    fn from(result: HealthCheckResult) -> Self {
        Self::Result(result)
    }
}

/// Type-erased callback stored in the orchestrator's callback registry.
pub type CheckCallback = Arc<dyn Fn() -> BoxFuture<'static, CallbackOutcome> + Send + Sync>;

/// Wrap an async closure into a [`CheckCallback`].
pub fn callback<F, Fut, O>(f: F) -> CheckCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = O> + Send + 'static,
    O: Into<CallbackOutcome>,
{
    Arc::new(move || {
        let fut = f();
        Box::pin(async move { fut.await.into() })
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Thresholds
// ═══════════════════════════════════════════════════════════════════════════════

/// A warning/error threshold pair over a numeric measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Values at or above this are a warning
    pub warning: f64,
    /// Values at or above this are an error
    pub error: f64,
}

impl Thresholds {
    /// Create a threshold pair.
    pub const fn new(warning: f64, error: f64) -> Self {
        Self { warning, error }
    }

    /// Classify a measurement against the thresholds.
    pub fn classify(&self, value: f64) -> HealthStatus {
        if value >= self.error {
            HealthStatus::Unhealthy
        } else if value >= self.warning {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
