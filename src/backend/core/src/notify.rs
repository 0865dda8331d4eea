//! Failure notifications.
//!
//! A notification channel receives the failed results of a run. Only the
//! webhook channel is provided here; richer channels are integrations left
//! to the embedding application.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::info;

use crate::check::HealthCheckResult;
use crate::error::Result;

/// A destination for failure notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Dispatch a notification for the given failed results.
    async fn notify(&self, failed: &[HealthCheckResult]) -> Result<()>;
}

/// Results that should trigger a notification (anything not healthy).
pub fn failed_results(results: &BTreeMap<String, HealthCheckResult>) -> Vec<HealthCheckResult> {
    results
        .values()
        .filter(|r| !r.is_healthy())
        .cloned()
        .collect()
}

/// Webhook notifier posting a JSON payload.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a notifier for a webhook URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, failed: &[HealthCheckResult]) -> Result<()> {
        if failed.is_empty() {
            return Ok(());
        }

        let names: Vec<&str> = failed.iter().map(|r| r.name.as_str()).collect();
        let payload = serde_json::json!({
            "text": format!("Health checks failing: {}", names.join(", ")),
            "checks": failed,
        });

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()
            .map_err(crate::error::VitalsError::from)?;

        info!(count = failed.len(), "Dispatched health check failure notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_results_filters_healthy() {
        let mut results = BTreeMap::new();
        results.insert("a".to_string(), HealthCheckResult::healthy("a"));
        results.insert(
            "b".to_string(),
            HealthCheckResult::unhealthy("b").with_error("down"),
        );
        results.insert("c".to_string(), HealthCheckResult::warning("c"));

        let failed = failed_results(&results);
        let names: Vec<&str> = failed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_webhook_empty_set_is_noop() {
        // No request is made for an empty set, so an unreachable URL is fine.
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/hook");
        assert!(notifier.notify(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_unreachable_is_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/hook");
        let failed = vec![HealthCheckResult::unhealthy("db").with_error("down")];
        assert!(notifier.notify(&failed).await.is_err());
    }
}
