//! System resource probe for containerized environments.
//!
//! Gathers CPU and memory usage from cgroup v2 (with v1 and procfs
//! fallbacks) and filesystem usage via `statvfs`, classifies each against
//! configurable thresholds, and reports the most severe of the three
//! sub-checks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::check::{HealthCheckResult, HealthStatus};
use crate::error::Result;
use crate::probe::{HealthCheck, Thresholds};

/// Default thresholds for every resource dimension (percent).
const DEFAULT_RESOURCE_THRESHOLDS: Thresholds = Thresholds::new(80.0, 90.0);

/// Sampling window for the CPU usage estimate.
const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for the system probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemProbeConfig {
    /// Whether the probe runs at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether a failure gates readiness
    #[serde(default)]
    pub critical: bool,

    /// Execution budget
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// CPU usage thresholds (percent)
    #[serde(default = "default_thresholds")]
    pub cpu_thresholds: Thresholds,

    /// Memory usage thresholds (percent)
    #[serde(default = "default_thresholds")]
    pub memory_thresholds: Thresholds,

    /// Filesystem usage thresholds (percent)
    #[serde(default = "default_thresholds")]
    pub disk_thresholds: Thresholds,

    /// Mount point checked for filesystem usage
    #[serde(default = "default_disk_path")]
    pub disk_path: String,
}

fn default_enabled() -> bool {
    true
}
fn default_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_thresholds() -> Thresholds {
    DEFAULT_RESOURCE_THRESHOLDS
}
fn default_disk_path() -> String {
    "/".to_string()
}

impl Default for SystemProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            critical: false,
            timeout: default_timeout(),
            cpu_thresholds: DEFAULT_RESOURCE_THRESHOLDS,
            memory_thresholds: DEFAULT_RESOURCE_THRESHOLDS,
            disk_thresholds: DEFAULT_RESOURCE_THRESHOLDS,
            disk_path: default_disk_path(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Probe
// ═══════════════════════════════════════════════════════════════════════════════

/// System resource health probe.
pub struct SystemProbe {
    config: SystemProbeConfig,
}

#[derive(Debug, Clone, Copy)]
struct MemoryUsage {
    used_bytes: u64,
    limit_bytes: u64,
}

impl MemoryUsage {
    fn usage_percent(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.limit_bytes as f64) * 100.0
    }
}

#[derive(Debug, Clone, Copy)]
struct DiskUsage {
    total_bytes: u64,
    available_bytes: u64,
}

impl DiskUsage {
    fn usage_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        (used as f64 / self.total_bytes as f64) * 100.0
    }
}

impl SystemProbe {
    /// Create a probe.
    pub fn new(config: SystemProbeConfig) -> Self {
        Self { config }
    }

    fn read_u64(path: impl AsRef<Path>) -> Option<u64> {
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    /// Memory usage from cgroup v2, cgroup v1, or /proc/meminfo.
    fn memory_usage() -> Option<MemoryUsage> {
        // cgroup v2
        if let Some(used) = Self::read_u64("/sys/fs/cgroup/memory.current") {
            let limit = fs::read_to_string("/sys/fs/cgroup/memory.max")
                .ok()
                .and_then(|s| s.trim().parse().ok());
            if let Some(limit) = limit {
                return Some(MemoryUsage {
                    used_bytes: used,
                    limit_bytes: limit,
                });
            }
        }

        // cgroup v1
        if let (Some(used), Some(limit)) = (
            Self::read_u64("/sys/fs/cgroup/memory/memory.usage_in_bytes"),
            Self::read_u64("/sys/fs/cgroup/memory/memory.limit_in_bytes"),
        ) {
            // An absurdly large limit means the cgroup is unconstrained.
            if limit < (1 << 60) {
                return Some(MemoryUsage {
                    used_bytes: used,
                    limit_bytes: limit,
                });
            }
        }

        // Host fallback
        let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
        let field = |name: &str| -> Option<u64> {
            meminfo
                .lines()
                .find(|line| line.starts_with(name))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|v| v.parse::<u64>().ok())
                .map(|kb| kb * 1024)
        };
        let total = field("MemTotal:")?;
        let available = field("MemAvailable:")?;
        Some(MemoryUsage {
            used_bytes: total.saturating_sub(available),
            limit_bytes: total,
        })
    }

    fn cgroup_cpu_usage_usec() -> Option<u64> {
        // cgroup v2 cpu.stat
        if let Ok(stat) = fs::read_to_string("/sys/fs/cgroup/cpu.stat") {
            return stat
                .lines()
                .find(|line| line.starts_with("usage_usec"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|v| v.parse().ok());
        }
        // cgroup v1 cpuacct reports nanoseconds
        Self::read_u64("/sys/fs/cgroup/cpuacct/cpuacct.usage").map(|ns| ns / 1_000)
    }

    fn effective_cpu_count() -> f64 {
        // cgroup v2 quota, e.g. "200000 100000" for two CPUs
        if let Ok(max) = fs::read_to_string("/sys/fs/cgroup/cpu.max") {
            let mut parts = max.split_whitespace();
            if let (Some(quota), Some(period)) = (parts.next(), parts.next()) {
                if let (Ok(quota), Ok(period)) = (quota.parse::<f64>(), period.parse::<f64>()) {
                    if period > 0.0 {
                        return quota / period;
                    }
                }
            }
        }
        std::thread::available_parallelism()
            .map(|n| n.get() as f64)
            .unwrap_or(1.0)
    }

    /// CPU usage percentage sampled over a short window.
    async fn cpu_usage_percent() -> Option<f64> {
        let first = Self::cgroup_cpu_usage_usec();
        if let Some(first) = first {
            tokio::time::sleep(CPU_SAMPLE_WINDOW).await;
            let second = Self::cgroup_cpu_usage_usec()?;
            let delta_usec = second.saturating_sub(first) as f64;
            let window_usec = CPU_SAMPLE_WINDOW.as_micros() as f64;
            let cpus = Self::effective_cpu_count().max(0.01);
            return Some((delta_usec / (window_usec * cpus)) * 100.0);
        }

        // Host fallback: 1-minute load average scaled by CPU count.
        let loadavg = fs::read_to_string("/proc/loadavg").ok()?;
        let load: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
        let cpus = std::thread::available_parallelism().ok()?.get() as f64;
        Some((load / cpus) * 100.0)
    }

    fn disk_usage(path: &str) -> Option<DiskUsage> {
        let c_path = CString::new(path).ok()?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return None;
        }
        let block = stat.f_frsize as u64;
        Some(DiskUsage {
            total_bytes: stat.f_blocks as u64 * block,
            available_bytes: stat.f_bavail as u64 * block,
        })
    }

    fn is_container() -> bool {
        if Path::new("/.dockerenv").exists() {
            return true;
        }
        fs::read_to_string("/proc/1/cgroup")
            .map(|c| {
                c.contains("docker") || c.contains("kubepods") || c.contains("containerd")
            })
            .unwrap_or(false)
    }

    fn container_metadata() -> serde_json::Value {
        let hostname = fs::read_to_string("/proc/sys/kernel/hostname")
            .map(|h| h.trim().to_string())
            .unwrap_or_default();

        let mut info = serde_json::json!({
            "is_container": Self::is_container(),
            "hostname": hostname,
        });
        if std::env::var("KUBERNETES_SERVICE_HOST").is_ok() {
            info["orchestration"] = serde_json::json!("kubernetes");
            if let Ok(namespace) = std::env::var("POD_NAMESPACE") {
                info["namespace"] = serde_json::json!(namespace);
            }
        }
        info
    }

    /// Classify the three sub-checks and return the worst outcome with the
    /// note that describes it.
    fn worst_sub_check(
        &self,
        memory_pct: Option<f64>,
        cpu_pct: Option<f64>,
        disk_pct: Option<f64>,
    ) -> (HealthStatus, Option<String>) {
        let checks = [
            ("Memory", memory_pct, &self.config.memory_thresholds),
            ("CPU", cpu_pct, &self.config.cpu_thresholds),
            ("Disk", disk_pct, &self.config.disk_thresholds),
        ];

        let mut worst = (HealthStatus::Healthy, None);
        for (label, value, thresholds) in checks {
            let Some(value) = value else { continue };
            let status = thresholds.classify(value);
            if status.is_worse_than(worst.0) {
                let level = match status {
                    HealthStatus::Warning => "warning",
                    _ => "error",
                };
                worst = (
                    status,
                    Some(format!(
                        "{label} usage at {value:.1}% exceeds {level} threshold"
                    )),
                );
            }
        }
        worst
    }
}

#[async_trait]
impl HealthCheck for SystemProbe {
    fn name(&self) -> &str {
        "system"
    }

    fn display_name(&self) -> String {
        "System Resources".to_string()
    }

    fn description(&self) -> String {
        "Monitors container CPU, memory, and disk usage".to_string()
    }

    fn is_critical(&self) -> bool {
        self.config.critical
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn tags(&self) -> Vec<String> {
        vec!["system".into(), "resources".into()]
    }

    async fn execute(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();

        let memory = Self::memory_usage();
        let memory_pct = memory.map(|m| m.usage_percent());
        let cpu_pct = Self::cpu_usage_percent().await;
        let disk = Self::disk_usage(&self.config.disk_path);
        let disk_pct = disk.map(|d| d.usage_percent());

        let (status, note) = self.worst_sub_check(memory_pct, cpu_pct, disk_pct);

        let mut result = HealthCheckResult::new(self.name(), status)
            .with_metadata("container", Self::container_metadata());
        if let Some(memory) = memory {
            result = result.with_metadata(
                "memory",
                serde_json::json!({
                    "used_bytes": memory.used_bytes,
                    "limit_bytes": memory.limit_bytes,
                    "usage_percent": (memory.usage_percent() * 10.0).round() / 10.0,
                }),
            );
        }
        if let Some(cpu) = cpu_pct {
            result = result.with_metadata(
                "cpu",
                serde_json::json!({ "usage_percent": (cpu * 10.0).round() / 10.0 }),
            );
        }
        if let Some(disk) = disk {
            result = result.with_metadata(
                "filesystem",
                serde_json::json!({
                    "path": self.config.disk_path,
                    "total_bytes": disk.total_bytes,
                    "available_bytes": disk.available_bytes,
                    "usage_percent": (disk.usage_percent() * 10.0).round() / 10.0,
                }),
            );
        }

        result = match status {
            HealthStatus::Healthy => result,
            HealthStatus::Warning => result.with_message(note.unwrap_or_default()),
            HealthStatus::Unhealthy => result.with_error(note.unwrap_or_default()),
        };

        Ok(result.with_response_time(start.elapsed()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
