//! Object storage (S3-like) health probe.
//!
//! Verifies bucket reachability, performs a live write/read/delete round trip
//! with content verification, compares aggregate bucket size against
//! thresholds, and probes the required permission set by attempting each
//! corresponding operation. Access-denied responses are classified as missing
//! permissions and degrade to a warning while core operations still work.

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

use crate::check::{HealthCheckResult, HealthStatus};
use crate::error::{Result, VitalsError};
use crate::probe::{HealthCheck, Thresholds};

/// Default bucket size thresholds (bytes): 5 TB warning, 8 TB error.
const DEFAULT_SIZE_THRESHOLDS: Thresholds =
    Thresholds::new(5.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0, 8.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0);

/// Object key prefix used for probe artifacts.
const HEALTH_CHECK_PREFIX: &str = ".health-check";

/// Permissions the probe verifies, each by attempting the matching operation.
const REQUIRED_PERMISSIONS: [&str; 5] = [
    "s3:ListBucket",
    "s3:GetObject",
    "s3:PutObject",
    "s3:DeleteObject",
    "s3:GetBucketLocation",
];

/// Pages of object listings scanned when aggregating bucket metrics.
const METRICS_PAGE_LIMIT: usize = 8;

// ═══════════════════════════════════════════════════════════════════════════════
// Connector
// ═══════════════════════════════════════════════════════════════════════════════

/// Typed connector failure, so the probe can tell missing permissions apart
/// from hard errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store rejected the operation for lack of permission
    AccessDenied(String),
    /// Any other failure
    Other(String),
}

impl StoreError {
    /// Whether this failure is a permission rejection.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessDenied(msg) => write!(f, "access denied: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Aggregate bucket metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StoreMetrics {
    /// Number of objects counted
    pub object_count: u64,
    /// Total size of counted objects, bytes
    pub total_size_bytes: u64,
    /// Whether the listing was cut short by the page limit
    pub truncated: bool,
}

/// Narrow capability set the object-store probe needs from its client.
#[async_trait]
pub trait ObjectStoreConnector: Send + Sync {
    /// Lightweight bucket reachability check.
    async fn bucket_accessible(&self) -> std::result::Result<(), StoreError>;

    /// Store an object.
    async fn put(&self, key: &str, bytes: &[u8]) -> std::result::Result<(), StoreError>;

    /// Fetch an object.
    async fn get(&self, key: &str) -> std::result::Result<Vec<u8>, StoreError>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> std::result::Result<(), StoreError>;

    /// List object keys under a prefix (first page is enough).
    async fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, StoreError>;

    /// Aggregate object count and size.
    async fn metrics(&self) -> std::result::Result<StoreMetrics, StoreError>;
}

/// Production connector backed by the AWS S3 SDK.
pub struct S3Connector {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Connector {
    /// Wrap an S3 client bound to one bucket.
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn classify<E>(err: SdkError<E>) -> StoreError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        match err.code() {
            Some("AccessDenied") | Some("Forbidden") => StoreError::AccessDenied(err.to_string()),
            _ => StoreError::Other(err.to_string()),
        }
    }
}

#[async_trait]
impl ObjectStoreConnector for S3Connector {
    async fn bucket_accessible(&self) -> std::result::Result<(), StoreError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(Self::classify)
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> std::result::Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map(|_| ())
            .map_err(Self::classify)
    }

    async fn get(&self, key: &str) -> std::result::Result<Vec<u8>, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(Self::classify)?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Other(e.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(Self::classify)
    }

    async fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, StoreError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(10)
            .send()
            .await
            .map_err(Self::classify)?;
        Ok(output
            .contents()
            .iter()
            .filter_map(|o| o.key().map(str::to_string))
            .collect())
    }

    async fn metrics(&self) -> std::result::Result<StoreMetrics, StoreError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .into_paginator()
            .send();

        let mut metrics = StoreMetrics::default();
        let mut scanned = 0usize;
        while let Some(page) = pages.next().await {
            let page = page.map_err(Self::classify)?;
            for object in page.contents() {
                metrics.object_count += 1;
                metrics.total_size_bytes += object.size().unwrap_or(0).max(0) as u64;
            }
            scanned += 1;
            if scanned >= METRICS_PAGE_LIMIT {
                metrics.truncated = true;
                break;
            }
        }
        Ok(metrics)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Probe
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for the object-store probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreProbeConfig {
    /// Whether the probe runs at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether a failure gates readiness
    #[serde(default = "default_critical")]
    pub critical: bool,

    /// Execution budget; object stores get a generous default
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Bucket name; empty means not configured
    #[serde(default)]
    pub bucket: String,

    /// Aggregate bucket size thresholds (bytes)
    #[serde(default = "default_size_thresholds")]
    pub size_thresholds: Thresholds,
}

fn default_enabled() -> bool {
    true
}
fn default_critical() -> bool {
    true
}
fn default_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_size_thresholds() -> Thresholds {
    DEFAULT_SIZE_THRESHOLDS
}

impl Default for ObjectStoreProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            critical: true,
            timeout: default_timeout(),
            bucket: String::new(),
            size_thresholds: DEFAULT_SIZE_THRESHOLDS,
        }
    }
}

/// Object storage health probe.
pub struct ObjectStoreProbe {
    connector: Option<Arc<dyn ObjectStoreConnector>>,
    config: ObjectStoreProbeConfig,
}

impl ObjectStoreProbe {
    /// Create a probe over an optional connector.
    pub fn new(
        connector: Option<Arc<dyn ObjectStoreConnector>>,
        config: ObjectStoreProbeConfig,
    ) -> Self {
        Self { connector, config }
    }

    /// Write, read back with verification, then delete.
    async fn verify_read_write(
        &self,
        connector: &Arc<dyn ObjectStoreConnector>,
    ) -> std::result::Result<(), String> {
        let key = format!("{HEALTH_CHECK_PREFIX}-{}", Uuid::new_v4());
        let content = format!("health-check-{}", Uuid::new_v4());

        connector
            .put(&key, content.as_bytes())
            .await
            .map_err(|e| format!("Failed to write test object: {e}"))?;

        let read = match connector.get(&key).await {
            Ok(read) => read,
            Err(e) => {
                let _ = connector.delete(&key).await;
                return Err(format!("Failed to read test object: {e}"));
            }
        };
        if read != content.as_bytes() {
            let _ = connector.delete(&key).await;
            return Err("Content verification failed".to_string());
        }

        connector
            .delete(&key)
            .await
            .map_err(|e| format!("Failed to delete test object: {e}"))?;
        Ok(())
    }

    /// Attempt the operation behind each required permission, collecting the
    /// ones rejected with access-denied.
    async fn missing_permissions(
        &self,
        connector: &Arc<dyn ObjectStoreConnector>,
    ) -> Vec<&'static str> {
        let key = format!("{HEALTH_CHECK_PREFIX}-perm-{}", Uuid::new_v4());
        let mut missing = Vec::new();

        for permission in REQUIRED_PERMISSIONS {
            let denied = match permission {
                "s3:ListBucket" => connector
                    .list(HEALTH_CHECK_PREFIX)
                    .await
                    .err()
                    .map(|e| e.is_access_denied()),
                "s3:PutObject" => connector
                    .put(&key, b"probe")
                    .await
                    .err()
                    .map(|e| e.is_access_denied()),
                "s3:GetObject" => match connector.get(&key).await {
                    Ok(_) => None,
                    Err(e) => Some(e.is_access_denied()),
                },
                "s3:DeleteObject" => connector
                    .delete(&key)
                    .await
                    .err()
                    .map(|e| e.is_access_denied()),
                "s3:GetBucketLocation" => connector
                    .bucket_accessible()
                    .await
                    .err()
                    .map(|e| e.is_access_denied()),
                _ => None,
            };
            if denied == Some(true) {
                missing.push(permission);
            }
        }
        missing
    }
}

#[async_trait]
impl HealthCheck for ObjectStoreProbe {
    fn name(&self) -> &str {
        "s3"
    }

    fn display_name(&self) -> String {
        "Object Storage".to_string()
    }

    fn description(&self) -> String {
        "Checks object storage accessibility, permissions, and capacity".to_string()
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
        self.config.enabled && !self.config.bucket.is_empty()
    }

    fn minimum_interval(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn tags(&self) -> Vec<String> {
        vec!["storage".into(), "s3".into(), "core".into()]
    }

    async fn execute(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();

        if self.config.bucket.is_empty() {
            return Ok(VitalsError::misconfigured(self.name(), "bucket not configured")
                .into_result(self.name()));
        }
        let connector = match &self.connector {
            Some(connector) => connector,
            None => {
                return Ok(VitalsError::misconfigured(
                    self.name(),
                    "no object store client configured",
                )
                .into_result(self.name()));
            }
        };

        if let Err(e) = connector.bucket_accessible().await {
            return Ok(HealthCheckResult::unhealthy(self.name())
                .with_response_time(start.elapsed())
                .with_error(format!("Bucket not accessible: {e}"))
                .with_metadata("bucket", &self.config.bucket));
        }

        if let Err(e) = self.verify_read_write(connector).await {
            return Ok(HealthCheckResult::unhealthy(self.name())
                .with_response_time(start.elapsed())
                .with_error(e)
                .with_metadata("bucket", &self.config.bucket));
        }

        let mut result = HealthCheckResult::healthy(self.name())
            .with_metadata("bucket", &self.config.bucket)
            .with_metadata("operations_test", "passed");

        match connector.metrics().await {
            Ok(metrics) => {
                result = result
                    .with_metadata("object_count", metrics.object_count)
                    .with_metadata("size_bytes", metrics.total_size_bytes);
                if metrics.truncated {
                    result = result.with_metadata("metrics_truncated", true);
                }
                match self
                    .config
                    .size_thresholds
                    .classify(metrics.total_size_bytes as f64)
                {
                    HealthStatus::Healthy => {}
                    HealthStatus::Warning => {
                        return Ok(HealthCheckResult::warning(self.name())
                            .with_response_time(start.elapsed())
                            .with_message("Bucket size exceeds warning threshold")
                            .with_metadata("bucket", &self.config.bucket)
                            .with_metadata("object_count", metrics.object_count)
                            .with_metadata("size_bytes", metrics.total_size_bytes));
                    }
                    HealthStatus::Unhealthy => {
                        return Ok(HealthCheckResult::unhealthy(self.name())
                            .with_response_time(start.elapsed())
                            .with_error("Bucket size exceeds error threshold")
                            .with_metadata("bucket", &self.config.bucket)
                            .with_metadata("object_count", metrics.object_count)
                            .with_metadata("size_bytes", metrics.total_size_bytes));
                    }
                }
            }
            Err(e) => {
                // Metrics are informational; reachability and the round trip
                // already passed.
                warn!(error = %e, bucket = %self.config.bucket, "Failed to gather bucket metrics");
                result = result.with_metadata("metrics_error", e.to_string());
            }
        }

        let missing = self.missing_permissions(connector).await;
        if !missing.is_empty() {
            return Ok(HealthCheckResult::warning(self.name())
                .with_response_time(start.elapsed())
                .with_message("Missing required permissions")
                .with_metadata("bucket", &self.config.bucket)
                .with_metadata("missing_permissions", &missing));
        }

        Ok(result
            .with_metadata("permissions", "all_required_permissions_granted")
            .with_response_time(start.elapsed()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
