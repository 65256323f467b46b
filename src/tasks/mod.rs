// src/tasks/mod.rs

//! Background task management. Periodic saturation refresh, reservation
//! sweeping, and metrics reporting run on tokio intervals and are aborted
//! together on shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info};

use sqlx::{Row, SqlitePool};

use crate::reservation::sweep;
use crate::scheduler::Scheduler;

pub mod config;
pub mod metrics;

use config::TaskConfig;
use metrics::EngineMetrics;

pub struct TaskManager {
    pool: SqlitePool,
    scheduler: Arc<Scheduler>,
    config: TaskConfig,
    metrics: Arc<EngineMetrics>,
    handles: Vec<JoinHandle<()>>,
}

impl TaskManager {
    pub fn new(pool: SqlitePool, scheduler: Arc<Scheduler>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            pool,
            scheduler,
            config: TaskConfig::from_env(),
            metrics,
            handles: Vec::new(),
        }
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Starts all enabled background tasks.
    pub fn start(&mut self) {
        info!("Starting background task manager");

        if self.config.saturation_refresh_enabled {
            let handle = self.spawn_saturation_refresher();
            self.handles.push(handle);
        }

        if self.config.sweep_enabled {
            let handle = self.spawn_reservation_sweeper();
            self.handles.push(handle);
        }

        if self.config.metrics_report_enabled {
            let handle = self.spawn_metrics_reporter();
            self.handles.push(handle);
        }

        info!("Started {} background tasks", self.handles.len());
    }

    /// Refreshes saturation snapshots for every recipient with recent
    /// engagement data, emitting zone alerts as snapshots land.
    fn spawn_saturation_refresher(&self) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let scheduler = self.scheduler.clone();
        let metrics = self.metrics.clone();
        let interval = Duration::from_secs(self.config.saturation_refresh_interval_secs);

        tokio::spawn(async move {
            info!("Saturation refresher started (interval: {:?})", interval);

            let mut interval_timer = time::interval(interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;

                match active_recipients(&pool).await {
                    Ok(recipients) => {
                        for recipient_id in recipients {
                            match scheduler.monitor().evaluate(&recipient_id).await {
                                Ok(snapshot) => {
                                    scheduler.alert_on_snapshot(&snapshot);
                                    metrics.record_snapshot_refreshed();
                                }
                                Err(e) => {
                                    error!("Saturation refresh failed for {}: {:#}", recipient_id, e);
                                    metrics.record_refresh_error();
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Failed to list active recipients: {:#}", e);
                    }
                }
            }
        })
    }

    fn spawn_reservation_sweeper(&self) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let metrics = self.metrics.clone();
        let interval = Duration::from_secs(self.config.sweep_interval_secs);

        tokio::spawn(async move {
            info!("Reservation sweeper started (interval: {:?})", interval);

            let mut interval_timer = time::interval(interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;

                match sweep::sweep_expired(&pool).await {
                    Ok(count) => {
                        if count > 0 {
                            metrics.record_swept(count);
                        }
                    }
                    Err(e) => {
                        error!("Reservation sweep failed: {}", e);
                    }
                }
            }
        })
    }

    fn spawn_metrics_reporter(&self) -> JoinHandle<()> {
        let metrics = self.metrics.clone();
        let interval = Duration::from_secs(self.config.metrics_report_interval_secs);

        tokio::spawn(async move {
            let mut interval_timer = time::interval(interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;
                let snap = metrics.snapshot();
                info!(
                    reservations_swept = snap.reservations_swept,
                    snapshots_refreshed = snap.snapshots_refreshed,
                    refresh_errors = snap.refresh_errors,
                    "engine metrics"
                );
            }
        })
    }

    /// Gracefully shuts down all tasks.
    pub async fn shutdown(self) {
        info!("Shutting down {} background tasks", self.handles.len());

        for handle in self.handles {
            handle.abort();
        }

        info!("All background tasks terminated");
    }
}

/// Recipients with engagement activity inside the last week.
async fn active_recipients(pool: &SqlitePool) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT recipient_id
        FROM engagement_events
        WHERE occurred_at > datetime('now', '-7 days')
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .filter_map(|row| row.try_get::<String, _>("recipient_id").ok())
        .collect())
}
