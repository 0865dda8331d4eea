//! Health check HTTP routes.
//!
//! - `GET /health/check[?check=NAME][&critical=bool]` runs fresh checks
//! - `GET /health/status` serves the cached snapshot
//! - `GET /health/ping` plaintext liveness for load balancers
//! - `GET /health/metrics` Prometheus exposition text
//! - `GET /health/docs` catalog of registered checks

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::check::HealthCheckResult;
use crate::error::VitalsError;
use crate::orchestrator::HealthOrchestrator;
use crate::report;

/// Shared state for the health routes.
#[derive(Clone)]
pub struct AppState {
    /// The process-wide orchestrator instance
    pub orchestrator: Arc<HealthOrchestrator>,
    /// Maintenance flag; when set, `/health/ping` reports unavailable
    pub maintenance: Arc<AtomicBool>,
    /// Whether `/health/ping` also gates on critical checks
    pub ping_check_critical: bool,
}

impl AppState {
    /// State with maintenance off.
    pub fn new(orchestrator: Arc<HealthOrchestrator>, ping_check_critical: bool) -> Self {
        Self {
            orchestrator,
            maintenance: Arc::new(AtomicBool::new(false)),
            ping_check_critical,
        }
    }
}

/// Build the health router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/check", get(check))
        .route("/health/status", get(status))
        .route("/health/ping", get(ping))
        .route("/health/metrics", get(metrics))
        .route("/health/docs", get(docs))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CheckParams {
    /// Run exactly one named check
    check: Option<String>,
    /// Restrict to critical checks
    #[serde(default)]
    critical: bool,
}

fn envelope_response(
    results: &std::collections::BTreeMap<String, HealthCheckResult>,
) -> Response {
    let healthy = !results.is_empty() && results.values().all(HealthCheckResult::is_healthy);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report::render_json(results))).into_response()
}

/// GET /health/check - run checks fresh.
async fn check(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> Result<Response, VitalsError> {
    if let Some(name) = params.check {
        let result = state.orchestrator.run_one(&name).await?;
        let status = if result.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        let body = serde_json::json!({
            "status": if result.is_healthy() { "healthy" } else { "unhealthy" },
            "timestamp": Utc::now().to_rfc3339(),
            "check": result,
        });
        return Ok((status, Json(body)).into_response());
    }

    let results = if params.critical {
        state.orchestrator.run_critical().await
    } else {
        state.orchestrator.run_all().await
    };
    Ok(envelope_response(&results))
}

/// GET /health/status - cached results.
async fn status(State(state): State<AppState>) -> Response {
    let results = state.orchestrator.cached_results().await;
    envelope_response(&results)
}

/// GET /health/ping - plaintext liveness.
async fn ping(State(state): State<AppState>) -> Response {
    if state.maintenance.load(Ordering::Relaxed) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Application is in maintenance mode",
        )
            .into_response();
    }

    if state.ping_check_critical {
        let results = state.orchestrator.run_critical().await;
        if results.values().any(|r| !r.is_healthy()) {
            return (StatusCode::SERVICE_UNAVAILABLE, "Critical checks failed").into_response();
        }
    }

    (StatusCode::OK, "pong").into_response()
}

/// GET /health/metrics - Prometheus exposition text.
async fn metrics(State(state): State<AppState>) -> Response {
    let results = state.orchestrator.cached_results().await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        report::render_prometheus(&results),
    )
        .into_response()
}

/// GET /health/docs - catalog of registered checks.
async fn docs(State(state): State<AppState>) -> Response {
    let checks = state.orchestrator.descriptors();
    let body = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "check": {"url": "/health/check", "method": "GET", "description": "Run health checks"},
            "status": {"url": "/health/status", "method": "GET", "description": "Get cached health status"},
            "ping": {"url": "/health/ping", "method": "GET", "description": "Simple ping endpoint"},
            "metrics": {"url": "/health/metrics", "method": "GET", "description": "Prometheus metrics endpoint"},
        },
        "checks": checks,
    });
    Json(body).into_response()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::HealthCheckResult;
    use crate::orchestrator::OrchestratorConfig;
    use crate::probe::HealthCheck;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct FixedCheck {
        name: &'static str,
        healthy: bool,
    }

    #[async_trait]
    impl HealthCheck for FixedCheck {
        fn name(&self) -> &str {
            self.name
        }

        fn is_critical(&self) -> bool {
            true
        }

        async fn execute(&self) -> crate::error::Result<HealthCheckResult> {
            Ok(if self.healthy {
                HealthCheckResult::healthy(self.name)
            } else {
                HealthCheckResult::unhealthy(self.name).with_error("down")
            })
        }
    }

    fn state_with(checks: Vec<FixedCheck>) -> AppState {
        let orchestrator = Arc::new(HealthOrchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(MemoryStore::new()),
        ));
        for check in checks {
            orchestrator.register(Arc::new(check)).unwrap();
        }
        AppState::new(orchestrator, false)
    }

    async fn get_response(state: AppState, uri: &str) -> (StatusCode, String) {
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    #[tokio::test]
    async fn test_check_endpoint_healthy() {
        let state = state_with(vec![FixedCheck {
            name: "database",
            healthy: true,
        }]);
        let (status, body) = get_response(state, "/health/check").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\": \"healthy\""));
    }

    #[tokio::test]
    async fn test_check_endpoint_unhealthy_is_503() {
        let state = state_with(vec![FixedCheck {
            name: "database",
            healthy: false,
        }]);
        let (status, body) = get_response(state, "/health/check").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("unhealthy"));
    }

    #[tokio::test]
    async fn test_single_check_not_found() {
        let state = state_with(vec![]);
        let (status, _) = get_response(state, "/health/check?check=ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ping() {
        let state = state_with(vec![]);
        let (status, body) = get_response(state, "/health/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "pong");
    }

    #[tokio::test]
    async fn test_ping_maintenance() {
        let state = state_with(vec![]);
        state.maintenance.store(true, Ordering::Relaxed);
        let (status, _) = get_response(state, "/health/ping").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = state_with(vec![FixedCheck {
            name: "database",
            healthy: true,
        }]);
        let (status, body) = get_response(state, "/health/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("health_check_status{check=\"database\"} 1"));
    }

    #[tokio::test]
    async fn test_docs_endpoint() {
        let state = state_with(vec![FixedCheck {
            name: "database",
            healthy: true,
        }]);
        let (status, body) = get_response(state, "/health/docs").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"database\""));
        assert!(body.contains("endpoints"));
    }
}
