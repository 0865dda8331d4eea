//! Integration tests for the health orchestrator.
//!
//! Spy checks count their executions so the tests can verify that disabled
//! checks, failed dependencies, and cache hits never invoke probe logic.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vitals_core::check::{HealthCheckResult, HealthStatus};
use vitals_core::orchestrator::{HealthOrchestrator, OrchestratorConfig};
use vitals_core::probe::HealthCheck;
use vitals_core::report;
use vitals_core::store::MemoryStore;

// ============================================================================
// Test Utilities
// ============================================================================

struct SpyCheck {
    name: String,
    status: HealthStatus,
    enabled: bool,
    critical: bool,
    deps: Vec<String>,
    delay: Duration,
    timeout: Duration,
    executions: Arc<AtomicU32>,
}

impl SpyCheck {
    fn new(name: &str, status: HealthStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            enabled: true,
            critical: false,
            deps: Vec::new(),
            delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
            executions: Arc::new(AtomicU32::new(0)),
        }
    }

    fn healthy(name: &str) -> Self {
        Self::new(name, HealthStatus::Healthy)
    }

    fn unhealthy(name: &str) -> Self {
        Self::new(name, HealthStatus::Unhealthy)
    }

    fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    fn depends_on(mut self, deps: &[&str]) -> Self {
        self.deps = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn counter(&self) -> Arc<AtomicU32> {
        self.executions.clone()
    }
}

#[async_trait]
impl HealthCheck for SpyCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_critical(&self) -> bool {
        self.critical
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn dependencies(&self) -> Vec<String> {
        self.deps.clone()
    }

    async fn execute(&self) -> vitals_core::Result<HealthCheckResult> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(match self.status {
            HealthStatus::Healthy => HealthCheckResult::healthy(&self.name),
            HealthStatus::Warning => {
                HealthCheckResult::warning(&self.name).with_message("degraded")
            }
            HealthStatus::Unhealthy => {
                HealthCheckResult::unhealthy(&self.name).with_error("forced failure")
            }
        })
    }
}

fn orchestrator() -> HealthOrchestrator {
    HealthOrchestrator::new(OrchestratorConfig::default(), Arc::new(MemoryStore::new()))
}

fn orchestrator_without_cache() -> HealthOrchestrator {
    let config = OrchestratorConfig {
        cache_enabled: false,
        ..OrchestratorConfig::default()
    };
    HealthOrchestrator::new(config, Arc::new(MemoryStore::new()))
}

// ============================================================================
// Result Map Shape
// ============================================================================

#[tokio::test]
async fn run_all_has_one_entry_per_registered_check() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::healthy("a"))).unwrap();
    orch.register(Arc::new(SpyCheck::unhealthy("b"))).unwrap();
    orch.register(Arc::new(SpyCheck::healthy("c").disabled()))
        .unwrap();

    let results = orch.run_all().await;
    let names: Vec<&str> = results.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn disabled_check_reports_warning_without_executing() {
    let orch = orchestrator();
    let check = SpyCheck::healthy("disabled").disabled();
    let executions = check.counter();
    orch.register(Arc::new(check)).unwrap();

    let results = orch.run_all().await;
    let result = &results["disabled"];
    assert_eq!(result.status, HealthStatus::Warning);
    assert_eq!(result.message.as_deref(), Some("Check is disabled"));
    assert_eq!(result.metadata["disabled"], serde_json::json!(true));
    assert_eq!(executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn one_failing_check_does_not_abort_the_others() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::unhealthy("bad"))).unwrap();
    orch.register(Arc::new(SpyCheck::healthy("good"))).unwrap();

    let results = orch.run_all().await;
    assert!(results["bad"].is_unhealthy());
    assert!(results["good"].is_healthy());
}

// ============================================================================
// Dependencies
// ============================================================================

#[tokio::test]
async fn dependency_failure_skips_dependent_body() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::unhealthy("a"))).unwrap();
    let b = SpyCheck::healthy("b").depends_on(&["a"]);
    let b_executions = b.counter();
    orch.register(Arc::new(b)).unwrap();

    let results = orch.run_all().await;
    assert!(results["a"].is_unhealthy());
    assert!(results["b"].is_unhealthy());
    assert!(results["b"]
        .error
        .as_deref()
        .unwrap()
        .contains("dependency 'a' is unavailable"));
    assert_eq!(b_executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn healthy_dependency_lets_dependent_run() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::healthy("a"))).unwrap();
    let b = SpyCheck::healthy("b").depends_on(&["a"]);
    let b_executions = b.counter();
    orch.register(Arc::new(b)).unwrap();

    let results = orch.run_all().await;
    assert!(results["a"].is_healthy());
    assert!(results["b"].is_healthy());
    assert_eq!(b_executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unregistered_dependency_counts_as_failed() {
    let orch = orchestrator();
    let b = SpyCheck::healthy("b").depends_on(&["ghost"]);
    let b_executions = b.counter();
    orch.register(Arc::new(b)).unwrap();

    let results = orch.run_all().await;
    assert!(results["b"].is_unhealthy());
    assert_eq!(b_executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dependency_cycle_fails_fast_without_deadlock() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::healthy("a").depends_on(&["b"])))
        .unwrap();
    orch.register(Arc::new(SpyCheck::healthy("b").depends_on(&["a"])))
        .unwrap();
    orch.register(Arc::new(SpyCheck::healthy("c"))).unwrap();

    let results = tokio::time::timeout(Duration::from_secs(5), orch.run_all())
        .await
        .expect("cycle must not deadlock");
    assert!(results["a"].is_unhealthy());
    assert!(results["a"].error.as_deref().unwrap().contains("cycle"));
    assert!(results["b"].is_unhealthy());
    assert!(results["c"].is_healthy());
}

#[tokio::test]
async fn run_one_resolves_dependencies_fresh() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::unhealthy("a"))).unwrap();
    let b = SpyCheck::healthy("b").depends_on(&["a"]);
    let b_executions = b.counter();
    orch.register(Arc::new(b)).unwrap();

    let result = orch.run_one("b").await.unwrap();
    assert!(result.is_unhealthy());
    assert_eq!(b_executions.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test]
async fn slow_check_times_out_within_bounded_overshoot() {
    let orch = orchestrator();
    orch.register(Arc::new(
        SpyCheck::healthy("slow")
            .with_delay(Duration::from_secs(10))
            .with_timeout(Duration::from_millis(50)),
    ))
    .unwrap();

    let start = Instant::now();
    let result = orch.run_one("slow").await.unwrap();
    let elapsed = start.elapsed();

    assert!(result.is_unhealthy());
    assert!(result.error.as_deref().unwrap().contains("timed out"));
    assert!(
        elapsed < Duration::from_secs(2),
        "timeout overshoot too large: {elapsed:?}"
    );
}

#[tokio::test]
async fn expired_overall_deadline_produces_synthetic_timeouts() {
    let orch = orchestrator_without_cache();
    let check = SpyCheck::healthy("a");
    let executions = check.counter();
    orch.register(Arc::new(check)).unwrap();

    let results = orch
        .run_all_with_deadline(Some(Instant::now() - Duration::from_secs(1)))
        .await;
    assert!(results["a"].is_unhealthy());
    assert!(results["a"].error.as_deref().unwrap().contains("timed out"));
    assert_eq!(executions.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Critical Subset
// ============================================================================

#[tokio::test]
async fn run_critical_is_strict_subset_of_run_all() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::healthy("core").critical()))
        .unwrap();
    orch.register(Arc::new(SpyCheck::healthy("extra"))).unwrap();

    let all = orch.run_all().await;
    let critical = orch.run_critical().await;

    assert_eq!(all.len(), 2);
    assert_eq!(critical.len(), 1);
    assert!(critical.contains_key("core"));
    assert!(critical.keys().all(|k| all.contains_key(k)));
}

#[tokio::test]
async fn non_critical_failure_does_not_flip_readiness() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::healthy("core").critical()))
        .unwrap();
    orch.register(Arc::new(SpyCheck::unhealthy("extra"))).unwrap();

    let critical = orch.run_critical().await;
    assert!(critical.values().all(|r| r.is_healthy()));

    let all = orch.run_all().await;
    assert!(!all.values().all(|r| r.is_healthy()));
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn cached_results_do_not_reinvoke_checks() {
    let orch = orchestrator();
    let check = SpyCheck::healthy("a");
    let executions = check.counter();
    orch.register(Arc::new(check)).unwrap();

    let fresh = orch.run_all().await;
    assert_eq!(executions.load(Ordering::SeqCst), 1);

    let cached = orch.cached_results().await;
    assert_eq!(executions.load(Ordering::SeqCst), 1, "cache hit must not re-run");
    assert_eq!(cached["a"].name, fresh["a"].name);
    assert_eq!(cached["a"].status, fresh["a"].status);
    assert_eq!(cached["a"].response_time_ms, fresh["a"].response_time_ms);
}

#[tokio::test]
async fn clear_cache_forces_fresh_run() {
    let orch = orchestrator();
    let check = SpyCheck::healthy("a");
    let executions = check.counter();
    orch.register(Arc::new(check)).unwrap();

    orch.run_all().await;
    orch.clear_cache().await;
    orch.cached_results().await;
    assert_eq!(executions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn disabled_cache_always_runs_fresh() {
    let orch = orchestrator_without_cache();
    let check = SpyCheck::healthy("a");
    let executions = check.counter();
    orch.register(Arc::new(check)).unwrap();

    orch.run_all().await;
    orch.cached_results().await;
    assert_eq!(executions.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Callbacks
// ============================================================================

#[tokio::test]
async fn callback_checks_participate_in_run_all() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::healthy("typed"))).unwrap();
    orch.register_callback("bool-pass", || async { true }).unwrap();
    orch.register_callback("bool-fail", || async { false }).unwrap();
    orch.register_callback("full", || async {
        HealthCheckResult::warning("full").with_message("adhoc warning")
    })
    .unwrap();

    let results = orch.run_all().await;
    assert_eq!(results.len(), 4);
    assert!(results["bool-pass"].is_healthy());
    assert!(results["bool-fail"].is_unhealthy());
    assert_eq!(results["bool-fail"].error.as_deref(), Some("Check failed"));
    assert!(results["full"].has_warning());
}

#[tokio::test]
async fn run_one_finds_callbacks() {
    let orch = orchestrator();
    orch.register_callback("adhoc", || async { true }).unwrap();
    let result = orch.run_one("adhoc").await.unwrap();
    assert!(result.is_healthy());
}

// ============================================================================
// Idempotence and Registry
// ============================================================================

#[tokio::test]
async fn run_one_is_idempotent_on_status() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::healthy("a"))).unwrap();

    let first = orch.run_one("a").await.unwrap();
    let second = orch.run_one("a").await.unwrap();
    assert_eq!(first.status, second.status);
}

#[tokio::test]
async fn unregistered_check_disappears_from_runs() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::healthy("a"))).unwrap();
    orch.register(Arc::new(SpyCheck::healthy("b"))).unwrap();

    orch.unregister("a");
    let results = orch.run_all().await;
    assert!(!results.contains_key("a"));
    assert!(results.contains_key("b"));
}

// ============================================================================
// System Status and Reporting
// ============================================================================

#[tokio::test]
async fn system_status_aggregates_cached_results() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::healthy("a"))).unwrap();
    orch.register(Arc::new(SpyCheck::unhealthy("b"))).unwrap();

    let status = orch.system_status().await;
    assert_eq!(status.status, "unhealthy");
    assert_eq!(status.meta.total_checks, 2);
    assert_eq!(status.meta.healthy_checks, 1);
    assert_eq!(status.meta.unhealthy_checks, 1);
}

#[tokio::test]
async fn healthy_run_maps_to_zero_exit_and_healthy_json() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::healthy("a").critical()))
        .unwrap();
    orch.register(Arc::new(SpyCheck::healthy("b"))).unwrap();

    let all = orch.run_all().await;
    assert_eq!(report::exit_code(&all), 0);
    assert_eq!(report::render_json(&all)["status"], "healthy");
}

#[tokio::test]
async fn non_critical_failure_flips_status_but_not_readiness() {
    let orch = orchestrator();
    orch.register(Arc::new(SpyCheck::healthy("core").critical()))
        .unwrap();
    orch.register(Arc::new(SpyCheck::unhealthy("extra"))).unwrap();

    let all = orch.run_all().await;
    assert_eq!(report::exit_code(&all), 1);
    assert_eq!(report::render_json(&all)["status"], "unhealthy");

    let readiness = orch.run_critical().await;
    assert_eq!(report::exit_code(&readiness), 0);
    assert_eq!(report::render_json(&readiness)["status"], "healthy");
}
