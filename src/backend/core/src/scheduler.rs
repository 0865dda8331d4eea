//! Background scheduler.
//!
//! Re-runs health checks on a fixed interval, keeping the cached snapshot
//! warm. Per-probe advisory minimum intervals are honored: a check whose
//! interval has not elapsed is skipped for that tick and its previous result
//! is carried forward.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::orchestrator::HealthOrchestrator;

/// Handle to a running scheduler; dropping the handle does not stop it.
pub struct SchedulerHandle {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl SchedulerHandle {
    /// Signal the scheduler to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Spawn the periodic runner.
pub fn spawn(orchestrator: Arc<HealthOrchestrator>, interval: Duration) -> SchedulerHandle {
    let (shutdown, mut stopped) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs_f64(), "Health check scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let results = orchestrator.run_due().await;
                    debug!(checks = results.len(), "Scheduled health check run completed");
                }
                _ = stopped.changed() => {
                    info!("Health check scheduler stopped");
                    break;
                }
            }
        }
    });

    SchedulerHandle { task, shutdown }
}
