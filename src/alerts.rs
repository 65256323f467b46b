// src/alerts.rs

//! Broadcast alert bus. Emitters never block and never fail: an alert with
//! no listeners is logged and dropped.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub severity: Severity,
    pub recipient_id: String,
    pub message: String,
    pub metrics: serde_json::Value,
}

#[derive(Clone)]
pub struct AlertBus {
    tx: broadcast::Sender<AlertEvent>,
}

impl AlertBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: AlertEvent) {
        if self.tx.send(event).is_err() {
            debug!("alert dropped, no subscribers");
        }
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new(64)
    }
}
