//! End-to-end probe scenarios through the orchestrator, using fake
//! connectors in place of real network clients.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vitals_core::check::HealthStatus;
use vitals_core::orchestrator::{HealthOrchestrator, OrchestratorConfig};
use vitals_core::probe::{
    BrokerConnector, BrokerMetadata, BrokerProbe, BrokerProbeConfig, CacheConnector, CacheProbe,
    CacheProbeConfig, CacheServerInfo, DatabaseConnector, DatabaseProbe, DatabaseProbeConfig,
    PartitionLag, PoolStats,
};
use vitals_core::store::MemoryStore;
use vitals_core::Result;

fn orchestrator() -> HealthOrchestrator {
    HealthOrchestrator::new(OrchestratorConfig::default(), Arc::new(MemoryStore::new()))
}

// ============================================================================
// Database: saturated connection pool
// ============================================================================

struct SaturatedPool;

#[async_trait]
impl DatabaseConnector for SaturatedPool {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn pool_stats(&self) -> Result<PoolStats> {
        Ok(PoolStats {
            active: 19,
            idle: 1,
            max: 20,
        })
    }

    async fn replica_lag_secs(&self) -> Result<Option<f64>> {
        Ok(None)
    }
}

#[tokio::test]
async fn database_with_saturated_pool_reports_unhealthy() {
    let orch = orchestrator();
    orch.register(Arc::new(DatabaseProbe::new(
        Arc::new(SaturatedPool),
        DatabaseProbeConfig::default(),
    )))
    .unwrap();

    let result = orch.run_one("database").await.unwrap();
    assert_eq!(result.status, HealthStatus::Unhealthy);
    assert_eq!(
        result.metadata["connection_usage_percent"],
        serde_json::json!(95.0)
    );
}

// ============================================================================
// Broker: unconfigured
// ============================================================================

struct CountingBroker {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl BrokerConnector for CountingBroker {
    async fn fetch_metadata(&self) -> Result<BrokerMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(BrokerMetadata::default())
    }

    async fn consumer_lag(&self, _topics: &[String], _group: &str) -> Result<Vec<PartitionLag>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn produce_probe(&self, _topic: &str, _payload: &[u8]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn unconfigured_broker_warns_without_network_calls() {
    let orch = orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    orch.register(Arc::new(BrokerProbe::new(
        Some(Arc::new(CountingBroker {
            calls: calls.clone(),
        })),
        BrokerProbeConfig::default(), // empty broker list
    )))
    .unwrap();

    let result = orch.run_one("kafka").await.unwrap();
    assert_eq!(result.status, HealthStatus::Warning);
    assert!(result.message.as_deref().unwrap().contains("not configured"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Cache: verification failure surfaces through run_all
// ============================================================================

struct LyingCache;

#[async_trait]
impl CacheConnector for LyingCache {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn server_info(&self) -> Result<CacheServerInfo> {
        Ok(CacheServerInfo {
            version: "7.2.0".into(),
            used_memory_bytes: 10,
            max_memory_bytes: 1_000,
            ..CacheServerInfo::default()
        })
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        // Returns the wrong value, so read verification must fail.
        Ok(Some("not-what-was-written".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn cache_verification_mismatch_is_unhealthy_in_run_all() {
    let orch = orchestrator();
    orch.register(Arc::new(CacheProbe::new(
        Arc::new(LyingCache),
        CacheProbeConfig::default(),
    )))
    .unwrap();

    let results = orch.run_all().await;
    let result = &results["redis"];
    assert!(result.is_unhealthy());
    assert_eq!(
        result.error.as_deref(),
        Some("Cache read verification failed")
    );
}

// ============================================================================
// Mixed fleet aggregation
// ============================================================================

#[tokio::test]
async fn mixed_fleet_aggregates_most_severe() {
    let orch = orchestrator();
    orch.register(Arc::new(DatabaseProbe::new(
        Arc::new(SaturatedPool),
        DatabaseProbeConfig::default(),
    )))
    .unwrap();
    orch.register(Arc::new(BrokerProbe::new(
        None,
        BrokerProbeConfig::default(),
    )))
    .unwrap();

    let status = orch.system_status().await;
    assert_eq!(status.status, "unhealthy");
    assert_eq!(status.aggregate, HealthStatus::Unhealthy);
    assert_eq!(status.meta.total_checks, 2);
    assert_eq!(status.meta.warning_checks, 1);
    assert_eq!(status.meta.unhealthy_checks, 1);
}
