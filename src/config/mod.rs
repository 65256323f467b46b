// src/config/mod.rs

//! Engine configuration, loaded once from the environment and passed in
//! explicitly. Nothing here is global mutable state; components receive the
//! structs they need at construction time.

use serde::Deserialize;
use std::str::FromStr;

/// Parse an env var, falling back to a default on absence or parse failure.
/// Values may carry trailing comments and whitespace.
fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            clean_val.parse::<T>().unwrap_or(default)
        }
        Err(_) => default,
    }
}

/// Core engine knobs shared by the selection, reservation, and saturation paths.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    // ── Database
    pub database_url: String,
    pub sqlite_max_connections: u32,

    // ── Reservation engine
    /// Days before the same item may be reused for the same recipient.
    pub cooldown_days: i64,
    /// Reservation staleness window: rows older than this are swept inactive.
    pub reservation_stale_days: i64,
    /// Per-batch conflict count tolerated before the whole batch rolls back.
    pub conflict_tolerance: usize,

    // ── Budget caps (rolling window)
    pub max_urgent_per_window: i64,
    pub max_per_category: i64,
    pub budget_window_days: i64,

    // ── Candidate pool
    /// Floor below which the zero-signal filter is skipped entirely.
    pub min_pool_floor: usize,

    // ── Saturation
    /// Snapshot older than this is treated as missing (neutral zone fallback).
    pub snapshot_max_age_secs: i64,
    pub baseline_lookback_days: i64,

    // ── Alerting
    /// Rejected-slot fraction above which a conflict-rate alert is emitted.
    pub conflict_alert_threshold: f64,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_var_or("CADENCE_DATABASE_URL", "sqlite:./cadence.db".to_string()),
            sqlite_max_connections: env_var_or("CADENCE_SQLITE_MAX_CONNECTIONS", 10),
            cooldown_days: env_var_or("CADENCE_COOLDOWN_DAYS", 7),
            reservation_stale_days: env_var_or("CADENCE_RESERVATION_STALE_DAYS", 7),
            conflict_tolerance: env_var_or("CADENCE_CONFLICT_TOLERANCE", 0),
            max_urgent_per_window: env_var_or("CADENCE_MAX_URGENT_PER_WINDOW", 5),
            max_per_category: env_var_or("CADENCE_MAX_PER_CATEGORY", 20),
            budget_window_days: env_var_or("CADENCE_BUDGET_WINDOW_DAYS", 7),
            min_pool_floor: env_var_or("CADENCE_MIN_POOL_FLOOR", 5),
            snapshot_max_age_secs: env_var_or("CADENCE_SNAPSHOT_MAX_AGE_SECS", 900),
            baseline_lookback_days: env_var_or("CADENCE_BASELINE_LOOKBACK_DAYS", 90),
            conflict_alert_threshold: env_var_or("CADENCE_CONFLICT_ALERT_THRESHOLD", 0.25),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            sqlite_max_connections: 10,
            cooldown_days: 7,
            reservation_stale_days: 7,
            conflict_tolerance: 0,
            max_urgent_per_window: 5,
            max_per_category: 20,
            budget_window_days: 7,
            min_pool_floor: 5,
            snapshot_max_age_secs: 900,
            baseline_lookback_days: 90,
            conflict_alert_threshold: 0.25,
        }
    }
}

/// Knobs for the multi-recipient run loop. Injected, never hardcoded in the
/// worker pool itself.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Simultaneous per-recipient scheduling tasks.
    pub max_concurrency: usize,
    /// Consecutive failures after which remaining recipients are skipped.
    pub circuit_breaker_threshold: usize,
    /// Attempts per recipient (first try + retries).
    pub retry_attempts: usize,
    pub retry_delay_secs: u64,
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            max_concurrency: env_var_or("CADENCE_MAX_CONCURRENCY", 5),
            circuit_breaker_threshold: env_var_or("CADENCE_CIRCUIT_BREAKER_THRESHOLD", 3),
            retry_attempts: env_var_or("CADENCE_RETRY_ATTEMPTS", 2),
            retry_delay_secs: env_var_or("CADENCE_RETRY_DELAY_SECS", 1),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            circuit_breaker_threshold: 3,
            retry_attempts: 2,
            retry_delay_secs: 1,
        }
    }
}
