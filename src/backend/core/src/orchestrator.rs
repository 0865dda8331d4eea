//! Health check orchestrator.
//!
//! The orchestrator owns two registries (typed probes and ad-hoc callbacks),
//! schedules executions in dependency order, bounds every probe by its
//! declared timeout, caches full-run results with a TTL, and aggregates
//! per-check outcomes. A failure in one probe never aborts the others, and
//! the orchestrator itself never returns an error from a run: anything
//! unexpected becomes an `Unhealthy` result for the affected probe name.

use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use metrics::{counter, histogram};
use parking_lot::RwLock;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::check::{HealthCheckResult, HealthStatus, SystemStatus};
use crate::error::{Result, VitalsError};
use crate::probe::{CallbackOutcome, CheckCallback, CheckDescriptor, HealthCheck};
use crate::store::ResultStore;

/// Fixed cache key for the last full run's results.
pub const CACHE_KEY: &str = "health_check_results";

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration and Events
// ═══════════════════════════════════════════════════════════════════════════════

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Whether full-run results are cached
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// Cache entry time-to-live
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub cache_ttl: Duration,

    /// Execution budget for callback checks, which carry no timeout of their own
    #[serde(with = "humantime_serde", default = "default_callback_timeout")]
    pub callback_timeout: Duration,
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}
fn default_callback_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: default_cache_ttl(),
            callback_timeout: default_callback_timeout(),
        }
    }
}

/// Lifecycle event published for every probe execution.
#[derive(Debug, Clone)]
pub enum ProbeEvent {
    /// A probe is about to execute
    Started { check: String },
    /// A probe finished with the given status
    Completed { check: String, status: HealthStatus },
    /// A probe finished with a warning
    Warning { check: String },
    /// A probe finished unhealthy
    Failed { check: String },
    /// A probe was skipped without executing its body
    Skipped { check: String, reason: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════════════════════════

/// Registry, scheduler, cache, and aggregator for health checks.
///
/// One shared instance per process, injected into every entry point (CLI,
/// HTTP, scheduled jobs). All registries are synchronized, so administrative
/// registration changes race safely with concurrent runs.
pub struct HealthOrchestrator {
    config: OrchestratorConfig,
    checks: RwLock<HashMap<String, Arc<dyn HealthCheck>>>,
    callbacks: RwLock<HashMap<String, CheckCallback>>,
    store: Arc<dyn ResultStore>,
    events: broadcast::Sender<ProbeEvent>,
    last_run: DashMap<String, Instant>,
}

impl HealthOrchestrator {
    /// Create an orchestrator over a result store.
    pub fn new(config: OrchestratorConfig, store: Arc<dyn ResultStore>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            checks: RwLock::new(HashMap::new()),
            callbacks: RwLock::new(HashMap::new()),
            store,
            events,
            last_run: DashMap::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registry
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a typed probe, keyed by its `name()`.
    ///
    /// Re-registering a name replaces the previous probe.
    pub fn register(&self, check: Arc<dyn HealthCheck>) -> Result<()> {
        let name = check.name().to_string();
        if name.is_empty() {
            return Err(VitalsError::invalid_probe("check name must not be empty"));
        }
        debug!(check = %name, "Registered health check");
        self.checks.write().insert(name, check);
        Ok(())
    }

    /// Register an ad-hoc callback check.
    ///
    /// The callback may return a `bool` or a full [`HealthCheckResult`].
    pub fn register_callback<F, Fut, O>(&self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = O> + Send + 'static,
        O: Into<CallbackOutcome>,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(VitalsError::invalid_probe("check name must not be empty"));
        }
        debug!(check = %name, "Registered callback check");
        self.callbacks.write().insert(name, crate::probe::callback(f));
        Ok(())
    }

    /// Remove a check or callback. Unregistering an unknown name is a no-op.
    pub fn unregister(&self, name: &str) {
        self.checks.write().remove(name);
        self.callbacks.write().remove(name);
    }

    /// Whether a check or callback with this name is registered.
    pub fn has_check(&self, name: &str) -> bool {
        self.checks.read().contains_key(name) || self.callbacks.read().contains_key(name)
    }

    /// Sorted names of all registered checks and callbacks.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .checks
            .read()
            .keys()
            .chain(self.callbacks.read().keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Descriptors for every registered typed probe, for catalogs.
    pub fn descriptors(&self) -> Vec<CheckDescriptor> {
        let mut descriptors: Vec<CheckDescriptor> = self
            .checks
            .read()
            .values()
            .map(|check| CheckDescriptor::describe(check.as_ref()))
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Subscribe to probe lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProbeEvent> {
        self.events.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Runs
    // ─────────────────────────────────────────────────────────────────────────

    /// Run every registered check and callback, cache the results, and
    /// return them keyed by name.
    pub async fn run_all(&self) -> BTreeMap<String, HealthCheckResult> {
        self.run_all_with_deadline(None).await
    }

    /// `run_all` with a caller-supplied overall deadline. Probes with no
    /// remaining budget report synthetic timeouts instead of blocking.
    pub async fn run_all_with_deadline(
        &self,
        deadline: Option<Instant>,
    ) -> BTreeMap<String, HealthCheckResult> {
        let selected: Vec<_> = self
            .checks
            .read()
            .iter()
            .map(|(n, c)| (n.clone(), c.clone()))
            .collect();
        let results = self.run_selected(selected, true, deadline).await;
        if self.config.cache_enabled {
            self.cache_results(&results).await;
        }
        results
    }

    /// Run only the critical checks. Results are not written to the shared
    /// cache, which always reflects the last full run.
    pub async fn run_critical(&self) -> BTreeMap<String, HealthCheckResult> {
        let selected: Vec<_> = self
            .checks
            .read()
            .iter()
            .filter(|(_, c)| c.is_critical())
            .map(|(n, c)| (n.clone(), c.clone()))
            .collect();
        self.run_selected(selected, false, None).await
    }

    /// Run the checks that are due under their advisory minimum interval,
    /// merging fresh results over the last cached snapshot.
    ///
    /// This is the scheduler entry point; direct `run_all` calls never
    /// suppress by interval.
    pub async fn run_due(&self) -> BTreeMap<String, HealthCheckResult> {
        let now = Instant::now();
        let selected: Vec<_> = self
            .checks
            .read()
            .iter()
            .filter(|(name, check)| {
                self.last_run
                    .get(name.as_str())
                    .map(|at| now.duration_since(*at) >= check.minimum_interval())
                    .unwrap_or(true)
            })
            .map(|(n, c)| (n.clone(), c.clone()))
            .collect();

        for (name, _) in &selected {
            self.last_run.insert(name.clone(), now);
        }

        let fresh = self.run_selected(selected, true, None).await;

        // Carry over still-valid results for checks skipped this tick.
        let mut merged = self.read_cached().await.unwrap_or_default();
        merged.extend(fresh);
        if self.config.cache_enabled {
            self.cache_results(&merged).await;
        }
        merged
    }

    /// Run a single named check or callback.
    pub async fn run_one(&self, name: &str) -> Result<HealthCheckResult> {
        let callback = self.callbacks.read().get(name).cloned();
        if let Some(callback) = callback {
            return Ok(self.run_callback(name, callback, None).await);
        }

        let check = self.checks.read().get(name).cloned();
        match check {
            Some(check) => {
                let mut visiting = HashSet::new();
                visiting.insert(name.to_string());
                Ok(self
                    .execute_check(name, check, &BTreeMap::new(), None, visiting)
                    .await)
            }
            None => Err(VitalsError::probe_not_found(name)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cache
    // ─────────────────────────────────────────────────────────────────────────

    /// Last cached results, falling back to a fresh `run_all` when caching is
    /// disabled, the entry is missing or expired, or the read fails.
    pub async fn cached_results(&self) -> BTreeMap<String, HealthCheckResult> {
        if !self.config.cache_enabled {
            return self.run_all().await;
        }
        match self.read_cached().await {
            Some(results) if !results.is_empty() => results,
            _ => self.run_all().await,
        }
    }

    /// Invalidate the cached results unconditionally.
    pub async fn clear_cache(&self) {
        if let Err(e) = self.store.forget(CACHE_KEY).await {
            warn!(error = %e, "Failed to clear health check cache");
        }
    }

    /// Derived read-only status view over `cached_results`.
    pub async fn system_status(&self) -> SystemStatus {
        SystemStatus::from_results(self.cached_results().await)
    }

    async fn read_cached(&self) -> Option<BTreeMap<String, HealthCheckResult>> {
        match self.store.get(CACHE_KEY).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<HealthCheckResult>>(&bytes) {
                Ok(results) => Some(
                    results
                        .into_iter()
                        .map(|r| (r.name.clone(), r))
                        .collect(),
                ),
                Err(e) => {
                    warn!(error = %e, "Cached health check results are corrupt");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, store = self.store.name(), "Failed to read health check cache");
                None
            }
        }
    }

    async fn cache_results(&self, results: &BTreeMap<String, HealthCheckResult>) {
        let snapshot: Vec<&HealthCheckResult> = results.values().collect();
        let bytes = match serde_json::to_vec(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize health check results");
                return;
            }
        };
        if let Err(e) = self.store.put(CACHE_KEY, bytes, self.config.cache_ttl).await {
            // A cache write failure is never a run failure.
            warn!(error = %e, store = self.store.name(), "Failed to cache health check results");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Execute a selected set of typed checks (plus optionally all callbacks)
    /// in dependency waves.
    async fn run_selected(
        &self,
        selected: Vec<(String, Arc<dyn HealthCheck>)>,
        include_callbacks: bool,
        deadline: Option<Instant>,
    ) -> BTreeMap<String, HealthCheckResult> {
        let selected_names: HashSet<String> = selected.iter().map(|(n, _)| n.clone()).collect();
        let mut completed: BTreeMap<String, HealthCheckResult> = BTreeMap::new();

        // Probes on a dependency cycle fail fast instead of deadlocking.
        let cyclic = Self::cyclic_members(&selected);
        for name in &cyclic {
            error!(check = %name, "Health check is part of a dependency cycle");
            completed.insert(
                name.clone(),
                VitalsError::dependency_cycle(name.clone()).into_result(name),
            );
        }

        let mut remaining: HashMap<String, Arc<dyn HealthCheck>> = selected
            .into_iter()
            .filter(|(name, _)| !cyclic.contains(name))
            .collect();

        // Callbacks have no declared dependencies; they run alongside the
        // first wave.
        let callback_futures = if include_callbacks {
            let callbacks: Vec<_> = self
                .callbacks
                .read()
                .iter()
                .map(|(n, c)| (n.clone(), c.clone()))
                .collect();
            callbacks
                .into_iter()
                .map(|(name, cb)| async move {
                    let result = self.run_callback(&name, cb, deadline).await;
                    (name, result)
                })
                .collect()
        } else {
            Vec::new()
        };
        let callback_results = join_all(callback_futures);

        let wave_results = async {
            let mut results: BTreeMap<String, HealthCheckResult> = BTreeMap::new();
            while !remaining.is_empty() {
                let known: BTreeMap<String, HealthCheckResult> = completed
                    .iter()
                    .chain(results.iter())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();

                let ready: Vec<(String, Arc<dyn HealthCheck>)> = remaining
                    .iter()
                    .filter(|(_, check)| {
                        check
                            .dependencies()
                            .iter()
                            .all(|dep| !selected_names.contains(dep) || known.contains_key(dep))
                    })
                    .map(|(n, c)| (n.clone(), c.clone()))
                    .collect();

                if ready.is_empty() {
                    // Unreachable after cycle removal; report rather than spin.
                    for (name, _) in remaining.drain() {
                        results.insert(
                            name.clone(),
                            VitalsError::internal("scheduler could not order check")
                                .into_result(&name),
                        );
                    }
                    break;
                }

                for (name, _) in &ready {
                    remaining.remove(name);
                }

                let known = Arc::new(known);
                let wave = ready.into_iter().map(|(name, check)| {
                    let known = known.clone();
                    async move {
                        let mut visiting = HashSet::new();
                        visiting.insert(name.clone());
                        let result = self
                            .execute_check(&name, check, &known, deadline, visiting)
                            .await;
                        (name, result)
                    }
                });
                for (name, result) in join_all(wave).await {
                    results.insert(name, result);
                }
            }
            results
        };

        let (callback_results, wave_results) = futures::join!(callback_results, wave_results);
        completed.extend(wave_results);
        completed.extend(callback_results);
        completed
    }

    /// Names involved in dependency cycles among the selected checks.
    fn cyclic_members(selected: &[(String, Arc<dyn HealthCheck>)]) -> HashSet<String> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
        for (name, _) in selected {
            nodes.insert(name.clone(), graph.add_node(name.clone()));
        }
        for (name, check) in selected {
            for dep in check.dependencies() {
                if let (Some(&from), Some(&to)) = (nodes.get(&dep), nodes.get(name)) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let mut cyclic = HashSet::new();
        for component in tarjan_scc(&graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .map(|&idx| graph.find_edge(idx, idx).is_some())
                    .unwrap_or(false);
            if is_cycle {
                for idx in component {
                    cyclic.insert(graph[idx].clone());
                }
            }
        }
        cyclic
    }

    /// Per-probe execution algorithm: disabled short-circuit, dependency
    /// gating, bounded execution, full error containment.
    async fn execute_check(
        &self,
        name: &str,
        check: Arc<dyn HealthCheck>,
        known: &BTreeMap<String, HealthCheckResult>,
        deadline: Option<Instant>,
        visiting: HashSet<String>,
    ) -> HealthCheckResult {
        if !check.is_enabled() {
            self.emit(ProbeEvent::Skipped {
                check: name.to_string(),
                reason: "disabled".to_string(),
            });
            return HealthCheckResult::warning(name)
                .with_message("Check is disabled")
                .with_metadata("disabled", true);
        }

        for dep in check.dependencies() {
            if visiting.contains(&dep) {
                let result = VitalsError::dependency_cycle(name.to_string()).into_result(name);
                self.record(name, &result, Duration::ZERO);
                return result;
            }
            let healthy = match known.get(&dep) {
                Some(result) => result.is_healthy(),
                None => self.dependency_healthy(dep.clone(), visiting.clone()).await,
            };
            if !healthy {
                self.emit(ProbeEvent::Skipped {
                    check: name.to_string(),
                    reason: format!("dependency '{dep}' unhealthy"),
                });
                let result =
                    VitalsError::dependency_failure(name.to_string(), dep, "dependency check failed")
                        .into_result(name);
                self.record(name, &result, Duration::ZERO);
                return result;
            }
        }

        let budget = Self::effective_timeout(check.timeout(), deadline);
        let Some(budget) = budget else {
            let result = VitalsError::timeout(name.to_string(), Duration::ZERO).into_result(name);
            self.record(name, &result, Duration::ZERO);
            return result;
        };

        self.emit(ProbeEvent::Started {
            check: name.to_string(),
        });
        let start = Instant::now();

        // The probe body runs in its own task: a panic is contained, and on
        // timeout the task is aborted rather than awaited.
        let body = {
            let check = check.clone();
            tokio::spawn(async move { check.execute().await })
        };
        let abort = body.abort_handle();

        let result = match tokio::time::timeout(budget, body).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                let mut result = e.into_result(name);
                if result.response_time_ms == 0.0 {
                    result = result.with_response_time(start.elapsed());
                }
                result
            }
            Ok(Err(join_err)) => {
                error!(check = %name, error = %join_err, "Health check panicked");
                VitalsError::execution_failure(name.to_string(), "check panicked")
                    .into_result(name)
                    .with_response_time(start.elapsed())
            }
            Err(_) => {
                abort.abort();
                VitalsError::timeout(name.to_string(), budget).into_result(name)
            }
        };

        self.record(name, &result, start.elapsed());
        result
    }

    /// Resolve an out-of-set dependency's health by running it fresh.
    fn dependency_healthy(
        &self,
        name: String,
        mut visiting: HashSet<String>,
    ) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            visiting.insert(name.clone());

            let callback = self.callbacks.read().get(&name).cloned();
            if let Some(callback) = callback {
                return self.run_callback(&name, callback, None).await.is_healthy();
            }

            let check = self.checks.read().get(&name).cloned();
            match check {
                Some(check) => {
                    self.execute_check(&name, check, &BTreeMap::new(), None, visiting)
                        .await
                        .is_healthy()
                }
                None => false,
            }
        })
    }

    /// Run an ad-hoc callback check under the shared callback timeout.
    async fn run_callback(
        &self,
        name: &str,
        callback: CheckCallback,
        deadline: Option<Instant>,
    ) -> HealthCheckResult {
        let Some(budget) = Self::effective_timeout(self.config.callback_timeout, deadline) else {
            let result = VitalsError::timeout(name.to_string(), Duration::ZERO).into_result(name);
            self.record(name, &result, Duration::ZERO);
            return result;
        };

        self.emit(ProbeEvent::Started {
            check: name.to_string(),
        });
        let start = Instant::now();
        let body = tokio::spawn(callback());
        let abort = body.abort_handle();

        let result = match tokio::time::timeout(budget, body).await {
            Ok(Ok(CallbackOutcome::Result(result))) => result,
            Ok(Ok(CallbackOutcome::Passed(true))) => {
                HealthCheckResult::healthy(name).with_response_time(start.elapsed())
            }
            Ok(Ok(CallbackOutcome::Passed(false))) => HealthCheckResult::unhealthy(name)
                .with_response_time(start.elapsed())
                .with_error("Check failed"),
            Ok(Err(join_err)) => {
                error!(check = %name, error = %join_err, "Callback check panicked");
                VitalsError::execution_failure(name.to_string(), "check panicked")
                    .into_result(name)
                    .with_response_time(start.elapsed())
            }
            Err(_) => {
                abort.abort();
                VitalsError::timeout(name.to_string(), budget).into_result(name)
            }
        };

        self.record(name, &result, start.elapsed());
        result
    }

    /// Remaining budget under an optional overall deadline; `None` when the
    /// deadline has already passed.
    fn effective_timeout(per_check: Duration, deadline: Option<Instant>) -> Option<Duration> {
        match deadline {
            None => Some(per_check),
            Some(deadline) => {
                let remaining = deadline.checked_duration_since(Instant::now())?;
                if remaining.is_zero() {
                    None
                } else {
                    Some(per_check.min(remaining))
                }
            }
        }
    }

    fn emit(&self, event: ProbeEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, name: &str, result: &HealthCheckResult, elapsed: Duration) {
        counter!(
            "vitals_health_checks_total",
            "check" => name.to_string(),
            "status" => result.status.to_string(),
        )
        .increment(1);
        histogram!("vitals_health_check_duration_ms", "check" => name.to_string())
            .record(elapsed.as_secs_f64() * 1000.0);

        match result.status {
            HealthStatus::Healthy => {
                debug!(check = %name, "Health check passed");
                self.emit(ProbeEvent::Completed {
                    check: name.to_string(),
                    status: result.status,
                });
            }
            HealthStatus::Warning => {
                info!(check = %name, message = ?result.message, "Health check warning");
                self.emit(ProbeEvent::Warning {
                    check: name.to_string(),
                });
            }
            HealthStatus::Unhealthy => {
                warn!(check = %name, error = ?result.error, "Health check failed");
                self.emit(ProbeEvent::Failed {
                    check: name.to_string(),
                });
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
