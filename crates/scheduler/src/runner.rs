//! Scheduler loop

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gryork_audit::AuditRecorder;
use gryork_core::Clock;
use gryork_sla::{SlaEngine, TickReport};
use gryork_store::Store;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::dormancy::{sweep_dormant, SweepReport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between passes
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Days without a transition before a case is flagged dormant
    #[serde(default = "default_dormancy_days")]
    pub dormancy_days: u32,
}

fn default_tick_interval_secs() -> u64 {
    300
}

fn default_dormancy_days() -> u32 {
    14
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            dormancy_days: default_dormancy_days(),
        }
    }
}

/// Outcome of one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerReport {
    pub started_at: DateTime<Utc>,
    pub sla: TickReport,
    pub dormancy: SweepReport,
    /// Phases that could not run at all
    pub errors: Vec<String>,
}

impl SchedulerReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self.sla.failures.is_empty()
            && self.dormancy.failures.is_empty()
    }
}

pub struct Scheduler {
    sla: Arc<SlaEngine>,
    store: Arc<dyn Store>,
    audit: Arc<AuditRecorder>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        sla: Arc<SlaEngine>,
        store: Arc<dyn Store>,
        audit: Arc<AuditRecorder>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            sla,
            store,
            audit,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// One SLA tick followed by one dormancy sweep
    ///
    /// A failing phase is recorded in the report; the other still runs.
    pub async fn run_once(&self) -> SchedulerReport {
        let started_at = self.clock.now();
        let mut errors = Vec::new();

        let sla = match self.sla.tick().await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "SLA tick failed");
                errors.push(format!("sla tick: {}", e));
                TickReport::default()
            }
        };

        let dormancy = match sweep_dormant(
            self.store.as_ref(),
            &self.audit,
            self.config.dormancy_days,
            self.clock.now(),
        ) {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Dormancy sweep failed");
                errors.push(format!("dormancy sweep: {}", e));
                SweepReport::default()
            }
        };

        SchedulerReport {
            started_at,
            sla,
            dormancy,
            errors,
        }
    }

    /// Run passes on a fixed interval until stopped
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run_loop(shutdown_rx).await });
        SchedulerHandle { shutdown_tx, task }
    }

    async fn run_loop(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.tick_interval_secs.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            tick_interval_secs = period.as_secs(),
            dormancy_days = self.config.dormancy_days,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_once().await;
                    if report.is_clean() {
                        tracing::debug!(
                            reminders = report.sla.reminders,
                            escalations = report.sla.escalations,
                            dormant_cases = report.dormancy.marked,
                            "Scheduler pass complete"
                        );
                    } else {
                        tracing::warn!(
                            sla_failures = report.sla.failures.len(),
                            sweep_failures = report.dormancy.failures.len(),
                            errors = report.errors.len(),
                            "Scheduler pass completed with failures"
                        );
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Handle for stopping a started scheduler
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal shutdown and wait for the current pass to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
        tracing::info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
