//! # Vitals Core
//!
//! A health-check orchestration engine: pluggable probes with heterogeneous
//! backends, dependency ordering between probes, per-probe timeouts, result
//! caching with TTL, critical/non-critical severity classification, and
//! multi-format reporting.
//!
//! ## Architecture
//!
//! - **Check types**: three-level status with severity ordering, immutable
//!   per-probe results, aggregate views
//! - **Probes**: database, cache, message broker, object storage, system
//!   resources, and HTTP endpoints behind narrow connector traits
//! - **Orchestrator**: registry, dependency-wave scheduling, bounded
//!   execution, write-through result cache, lifecycle events
//! - **Reporters**: table, JSON, and Prometheus projections shared by the
//!   CLI and HTTP surfaces

pub mod bootstrap;
pub mod check;
pub mod config;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod routes;
pub mod scheduler;
pub mod store;
pub mod telemetry;

pub use error::{ErrorCode, Result, VitalsError};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::check::{HealthCheckResult, HealthStatus, HealthSummary, SystemStatus};
    pub use crate::config::Config;
    pub use crate::error::{ErrorCode, Result, VitalsError};
    pub use crate::orchestrator::{HealthOrchestrator, OrchestratorConfig, ProbeEvent};
    pub use crate::probe::{CallbackOutcome, CheckDescriptor, HealthCheck, Thresholds};
    pub use crate::report::ReportFormat;
    pub use crate::store::{MemoryStore, RedisStore, ResultStore};
}
