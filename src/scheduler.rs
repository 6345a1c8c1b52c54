//! Scheduled execution of the integration run
//!
//! An explicitly owned scheduler instance: one background loop fires the
//! orchestrator on a cron schedule, ad-hoc `run_now` triggers fire it
//! immediately without disturbing the schedule. Job failures are caught at
//! the job boundary and counted; nothing here can take the process down.

use chrono::Local;
use cron::Schedule;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::AuditEvent;
use crate::error::{RelayError, Result};
use crate::orchestrator::DeliveryOrchestrator;
use crate::store::AuditSink;

/// Fallback sleep when the schedule yields no upcoming fire time
const IDLE_WAIT: Duration = Duration::from_secs(60);

pub struct IntegrationScheduler {
    orchestrator: Arc<DeliveryOrchestrator>,
    audit: Arc<dyn AuditSink>,
    schedule: Arc<RwLock<Schedule>>,
    enabled: Arc<AtomicBool>,
    /// Wakes the loop when the schedule expression changes
    reschedule: Arc<Notify>,
    /// Job-boundary failure bookkeeping
    failures: Arc<AtomicU64>,
    shutdown: watch::Receiver<bool>,
}

impl IntegrationScheduler {
    /// Build a scheduler; the cron expression is validated here, before
    /// anything is registered
    pub fn new(
        orchestrator: Arc<DeliveryOrchestrator>,
        audit: Arc<dyn AuditSink>,
        cron_expr: &str,
        enabled: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let schedule = parse_schedule(cron_expr)?;

        Ok(Self {
            orchestrator,
            audit,
            schedule: Arc::new(RwLock::new(schedule)),
            enabled: Arc::new(AtomicBool::new(enabled)),
            reschedule: Arc::new(Notify::new()),
            failures: Arc::new(AtomicU64::new(0)),
            shutdown,
        })
    }

    /// Register the recurring job. Ticks fire only while enabled; the loop
    /// runs until the shutdown signal flips.
    pub fn initialize(&self) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let schedule = self.schedule.clone();
        let enabled = self.enabled.clone();
        let reschedule = self.reschedule.clone();
        let failures = self.failures.clone();
        let mut shutdown = self.shutdown.clone();

        if self.enabled.load(Ordering::SeqCst) {
            info!("Integration scheduler started");
        } else {
            info!("Integration scheduler registered but disabled");
        }

        tokio::spawn(async move {
            loop {
                let wait = next_fire_delay(&schedule);
                debug!("Next integration tick in {:?}", wait);

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if enabled.load(Ordering::SeqCst) {
                            run_job(&orchestrator, &failures).await;
                        } else {
                            debug!("Scheduler disabled; skipping tick");
                        }
                    }
                    _ = reschedule.notified() => {
                        debug!("Schedule changed; recomputing next tick");
                    }
                    changed = shutdown.changed() => {
                        // A dropped sender also means the process is going away
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Integration scheduler stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Resume firing without re-registering the job
    pub async fn start(&self) {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            info!("Integration scheduler enabled");
            self.append_audit(AuditEvent::info("Scheduler started")).await;
        }
    }

    /// Pause firing; the loop keeps running so `start` is cheap
    pub async fn stop(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            info!("Integration scheduler disabled");
            self.append_audit(AuditEvent::info("Scheduler paused")).await;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Count of job executions that ended in an error
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Replace the cron expression. The new expression is validated first;
    /// a rejected expression leaves the active schedule untouched.
    pub async fn update_schedule(&self, cron_expr: &str) -> Result<()> {
        let parsed = parse_schedule(cron_expr)?;

        match self.schedule.write() {
            Ok(mut guard) => *guard = parsed,
            Err(poisoned) => *poisoned.into_inner() = parsed,
        }
        self.reschedule.notify_one();

        info!("Integration schedule updated to '{}'", cron_expr);
        self.append_audit(
            AuditEvent::info("Schedule updated")
                .with_detail(format!("New cron expression: {cron_expr}")),
        )
        .await;
        Ok(())
    }

    /// Current cron expression
    pub fn schedule_expression(&self) -> String {
        match self.schedule.read() {
            Ok(guard) => guard.to_string(),
            Err(poisoned) => poisoned.into_inner().to_string(),
        }
    }

    /// Fire the job immediately, independent of the recurring schedule.
    /// Returns without waiting; the outcome lands in the store and audit log.
    pub async fn run_now(&self) {
        info!("Manual integration run triggered");
        self.append_audit(AuditEvent::info("Manual integration run triggered"))
            .await;

        let orchestrator = self.orchestrator.clone();
        let failures = self.failures.clone();
        tokio::spawn(async move {
            run_job(&orchestrator, &failures).await;
        });
    }

    async fn append_audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.append(&event).await {
            error!("Failed to append audit event '{}': {}", event.message, e);
        }
    }
}

fn parse_schedule(cron_expr: &str) -> Result<Schedule> {
    Schedule::from_str(cron_expr).map_err(|e| RelayError::Schedule(e.to_string()))
}

fn next_fire_delay(schedule: &Arc<RwLock<Schedule>>) -> Duration {
    let next = {
        let guard = match schedule.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.upcoming(Local).next()
    };

    match next {
        Some(at) => (at - Local::now()).to_std().unwrap_or(Duration::ZERO),
        None => IDLE_WAIT,
    }
}

/// Job boundary: failures are logged and counted, never propagated
async fn run_job(orchestrator: &Arc<DeliveryOrchestrator>, failures: &Arc<AtomicU64>) {
    match orchestrator.run_integration().await {
        Ok(report) if report.is_success() => {
            info!(
                "Scheduled integration done: {} entries in {} batches",
                report.delivered, report.chunks
            );
        }
        Ok(report) => {
            warn!(
                "Scheduled integration finished with {} failed batches",
                report.failed_chunks
            );
        }
        Err(e) => {
            failures.fetch_add(1, Ordering::SeqCst);
            error!("Scheduled integration failed: {}", e);
        }
    }
}
