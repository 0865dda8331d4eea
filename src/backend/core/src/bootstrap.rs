//! Configuration-driven assembly of the orchestrator.
//!
//! One orchestrator instance is built at process startup and injected into
//! every entry point (HTTP server, CLI, scheduler). Probes are registered
//! from the `health.checks` configuration tree; connectors that need
//! external endpoints are only wired when their configuration is present.

use std::sync::Arc;
use tracing::info;

use crate::config::{CacheStoreKind, Config};
use crate::notify::{Notifier, WebhookNotifier};
use crate::orchestrator::HealthOrchestrator;
use crate::probe::{
    BrokerProbe, CacheProbe, DatabaseProbe, HttpProbe, ObjectStoreConnector, ObjectStoreProbe,
    RedisConnector, S3Connector, SqlxDatabaseConnector, SystemProbe,
};
use crate::store::{MemoryStore, RedisStore, ResultStore};

/// Build the shared orchestrator and register every configured probe.
pub async fn build_orchestrator(config: &Config) -> anyhow::Result<Arc<HealthOrchestrator>> {
    let store: Arc<dyn ResultStore> = match config.health.cache_store {
        CacheStoreKind::Memory => Arc::new(MemoryStore::new()),
        CacheStoreKind::Redis => {
            let client = redis::Client::open(config.redis.url.as_str())?;
            Arc::new(RedisStore::new(client))
        }
    };

    let orchestrator = Arc::new(HealthOrchestrator::new(
        config.health.orchestrator.clone(),
        store,
    ));
    let checks = &config.health.checks;

    // Database probe, only when a connection URL is configured. The pool is
    // lazy so a down database surfaces in the probe, not at startup.
    if let Some(url) = &config.database.url {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect_lazy(url)?;
        let connector = Arc::new(SqlxDatabaseConnector::new(
            pool,
            config.database.max_connections,
        ));
        orchestrator.register(Arc::new(DatabaseProbe::new(
            connector,
            checks.database.clone(),
        )))?;
    }

    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    orchestrator.register(Arc::new(CacheProbe::new(
        Arc::new(RedisConnector::new(redis_client)),
        checks.redis.clone(),
    )))?;

    // No broker client is bundled; without a connector the probe reports the
    // not-configured warning.
    orchestrator.register(Arc::new(BrokerProbe::new(None, checks.kafka.clone())))?;

    let mut s3_config = checks.s3.clone();
    if s3_config.bucket.is_empty() {
        if let Some(bucket) = &config.storage.bucket {
            s3_config.bucket = bucket.clone();
        }
    }
    let s3_connector: Option<Arc<dyn ObjectStoreConnector>> = if s3_config.bucket.is_empty() {
        None
    } else {
        let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Some(Arc::new(S3Connector::new(
            aws_sdk_s3::Client::new(&aws),
            s3_config.bucket.clone(),
        )))
    };
    orchestrator.register(Arc::new(ObjectStoreProbe::new(s3_connector, s3_config)))?;

    orchestrator.register(Arc::new(SystemProbe::new(checks.system.clone())))?;

    for http in &checks.http {
        orchestrator.register(Arc::new(HttpProbe::new(http.clone())))?;
    }

    info!(
        checks = orchestrator.registered_names().len(),
        "Health orchestrator initialized"
    );
    Ok(orchestrator)
}

/// Build the failure notifier when notifications are configured.
pub fn build_notifier(config: &Config) -> Option<Arc<dyn Notifier>> {
    let notifications = &config.health.notifications;
    if !notifications.enabled {
        return None;
    }
    notifications
        .webhook_url
        .as_ref()
        .map(|url| Arc::new(WebhookNotifier::new(url.clone())) as Arc<dyn Notifier>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_registers_core_probes() {
        let config = Config::default();
        let orchestrator = build_orchestrator(&config).await.unwrap();
        let names = orchestrator.registered_names();

        // No database URL, so no database probe.
        assert!(!names.contains(&"database".to_string()));
        assert!(names.contains(&"redis".to_string()));
        assert!(names.contains(&"kafka".to_string()));
        assert!(names.contains(&"s3".to_string()));
        assert!(names.contains(&"system".to_string()));
    }

    #[test]
    fn test_notifier_disabled_by_default() {
        assert!(build_notifier(&Config::default()).is_none());
    }

    #[test]
    fn test_notifier_requires_webhook_url() {
        let mut config = Config::default();
        config.health.notifications.enabled = true;
        assert!(build_notifier(&config).is_none());

        config.health.notifications.webhook_url = Some("http://hooks.test/x".to_string());
        assert!(build_notifier(&config).is_some());
    }
}
