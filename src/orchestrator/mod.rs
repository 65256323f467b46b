// src/orchestrator/mod.rs

//! Multi-recipient run loop. One task per recipient behind a semaphore,
//! per-recipient retries, and a consecutive-failure circuit breaker that
//! skips the remainder of a run that has gone bad.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::alerts::{AlertBus, AlertEvent, Severity};
use crate::config::OrchestratorConfig;
use crate::scheduler::{ScheduleOutcome, ScheduleState, Scheduler};
use crate::types::{Item, RestrictionSet, ScheduleRequest};

/// Summary of one orchestrated run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub succeeded: Vec<String>,
    pub partial: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Recipients never attempted because the circuit breaker opened.
    pub skipped: Vec<String>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.partial.len() + self.failed.len()
    }
}

pub struct Orchestrator {
    scheduler: Arc<Scheduler>,
    config: OrchestratorConfig,
    alerts: AlertBus,
}

impl Orchestrator {
    pub fn new(scheduler: Arc<Scheduler>, config: OrchestratorConfig, alerts: AlertBus) -> Self {
        Self {
            scheduler,
            config,
            alerts,
        }
    }

    pub async fn run(
        &self,
        requests: Vec<ScheduleRequest>,
        items: Arc<Vec<Item>>,
        restrictions: Arc<Vec<RestrictionSet>>,
    ) -> RunReport {
        let started = Instant::now();
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let consecutive_failures = Arc::new(AtomicUsize::new(0));
        let report = Arc::new(Mutex::new(RunReport::default()));

        let mut tasks = JoinSet::new();
        for request in requests {
            let semaphore = semaphore.clone();
            let consecutive_failures = consecutive_failures.clone();
            let report = report.clone();
            let scheduler = self.scheduler.clone();
            let items = items.clone();
            let restrictions = restrictions.clone();
            let threshold = self.config.circuit_breaker_threshold;
            let attempts = self.config.retry_attempts.max(1);
            let retry_delay = self.config.retry_delay_secs;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let recipient = request.recipient_id.clone();

                if consecutive_failures.load(Ordering::SeqCst) >= threshold {
                    warn!(recipient_id = %recipient, "circuit breaker open, skipping");
                    report.lock().await.skipped.push(recipient);
                    return;
                }

                match run_one(&scheduler, &request, &items, &restrictions, attempts, retry_delay)
                    .await
                {
                    Ok(outcome) => {
                        consecutive_failures.store(0, Ordering::SeqCst);
                        let mut r = report.lock().await;
                        match outcome.state {
                            ScheduleState::Partial => r.partial.push(recipient),
                            ScheduleState::Failed => {
                                r.failed.push((recipient, "batch rolled back".to_string()))
                            }
                            _ => r.succeeded.push(recipient),
                        }
                    }
                    Err(e) => {
                        consecutive_failures.fetch_add(1, Ordering::SeqCst);
                        error!(recipient_id = %recipient, error = %e, "recipient failed");
                        report.lock().await.failed.push((recipient, e.to_string()));
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}

        let mut report = Arc::try_unwrap(report)
            .expect("run tasks finished")
            .into_inner();
        report.elapsed = started.elapsed();

        if !report.skipped.is_empty() {
            self.alerts.emit(AlertEvent {
                severity: Severity::Critical,
                recipient_id: String::new(),
                message: "circuit breaker opened during run".to_string(),
                metrics: serde_json::json!({
                    "skipped": report.skipped.len(),
                    "failed": report.failed.len(),
                    "total": total,
                }),
            });
        }

        info!(
            total,
            succeeded = report.succeeded.len(),
            partial = report.partial.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );
        report
    }
}

async fn run_one(
    scheduler: &Scheduler,
    request: &ScheduleRequest,
    items: &[Item],
    restrictions: &[RestrictionSet],
    attempts: usize,
    retry_delay_secs: u64,
) -> Result<ScheduleOutcome, crate::error::CoreError> {
    let mut last_err = None;
    for attempt in 1..=attempts {
        match scheduler.build_and_commit(request, items, restrictions).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                warn!(
                    recipient_id = %request.recipient_id,
                    attempt,
                    error = %e,
                    "scheduling attempt failed"
                );
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_secs(retry_delay_secs * attempt as u64))
                        .await;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt"))
}
