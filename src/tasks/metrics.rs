// src/tasks/metrics.rs

//! Process-local counters, reported periodically by the metrics task.

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub reservations_swept: u64,
    pub snapshots_refreshed: u64,
    pub refresh_errors: u64,
}

#[derive(Debug, Default)]
pub struct EngineMetrics {
    inner: RwLock<MetricsSnapshot>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_swept(&self, count: u64) {
        self.inner.write().reservations_swept += count;
    }

    pub fn record_snapshot_refreshed(&self) {
        self.inner.write().snapshots_refreshed += 1;
    }

    pub fn record_refresh_error(&self) {
        self.inner.write().refresh_errors += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        *self.inner.read()
    }
}
