// src/store/migration.rs
//! Schema for the scheduling core. Run at startup, safe to call every time
//! (idempotent). Add columns here as fields evolve.

use anyhow::Result;
use sqlx::{Executor, SqlitePool};

/// Per-(item, recipient) observation counts and revenue accumulators.
/// Written by the external feedback-ingestion job; read by the confidence
/// estimator and budget queries. Cached bounds are refreshed by the same job.
const CREATE_ITEM_STATS: &str = r#"
CREATE TABLE IF NOT EXISTS item_stats (
    item_id INTEGER NOT NULL,
    recipient_id TEXT NOT NULL,
    successes INTEGER NOT NULL DEFAULT 0 CHECK (successes >= 0),
    failures INTEGER NOT NULL DEFAULT 0 CHECK (failures >= 0),
    total_value REAL NOT NULL DEFAULT 0,
    last_used_at DATETIME,
    bound_lower REAL,
    bound_upper REAL,
    exploration_weight REAL,
    updated_at DATETIME,
    PRIMARY KEY (item_id, recipient_id)
);
"#;

/// Shared reservation table. The UNIQUE idempotency key plus the guarded
/// insert in the locker are what make concurrent commits race-free.
const CREATE_RESERVATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS reservations (
    idempotency_key TEXT PRIMARY KEY,
    item_id INTEGER NOT NULL,
    recipient_id TEXT NOT NULL,
    scheduled_at DATETIME NOT NULL,
    created_at DATETIME NOT NULL,
    expires_at DATETIME NOT NULL,
    schedule_id TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);
"#;

/// Usage journal written on successful batch commit. Feeds the cooldown
/// filter, the rolling budget window, and the diversity signal.
const CREATE_ITEM_USAGE: &str = r#"
CREATE TABLE IF NOT EXISTS item_usage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient_id TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    category TEXT NOT NULL,
    tier TEXT NOT NULL,
    urgent INTEGER NOT NULL DEFAULT 0,
    used_at DATETIME NOT NULL
);
"#;

/// Latest fatigue snapshot per recipient. Advisory and eventually consistent.
const CREATE_SATURATION_SNAPSHOTS: &str = r#"
CREATE TABLE IF NOT EXISTS saturation_snapshots (
    recipient_id TEXT PRIMARY KEY,
    zone TEXT NOT NULL,
    exhaustion_score REAL NOT NULL,
    volume_deviation REAL NOT NULL,
    conversion_deviation REAL NOT NULL,
    revenue_deviation REAL NOT NULL,
    predicted_saturation INTEGER NOT NULL DEFAULT 0,
    consecutive_decline_days INTEGER NOT NULL DEFAULT 0,
    generated_at DATETIME NOT NULL
);
"#;

/// Raw engagement rollups from the external feedback pipeline.
const CREATE_ENGAGEMENT_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS engagement_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient_id TEXT NOT NULL,
    occurred_at DATETIME NOT NULL,
    sends INTEGER NOT NULL DEFAULT 0,
    conversions INTEGER NOT NULL DEFAULT 0,
    revenue REAL NOT NULL DEFAULT 0
);
"#;

/// Hour-of-day/day-of-week historical baselines from the baseline provider.
const CREATE_ENGAGEMENT_BASELINES: &str = r#"
CREATE TABLE IF NOT EXISTS engagement_baselines (
    recipient_id TEXT NOT NULL,
    hour_of_day INTEGER NOT NULL,
    day_of_week INTEGER NOT NULL,
    metric TEXT NOT NULL,
    mean REAL NOT NULL,
    stddev REAL NOT NULL,
    PRIMARY KEY (recipient_id, hour_of_day, day_of_week, metric)
);
"#;

/// Committed plans, persisted for downstream export/display collaborators.
const CREATE_SCHEDULE_PLANS: &str = r#"
CREATE TABLE IF NOT EXISTS schedule_plans (
    schedule_id TEXT PRIMARY KEY,
    recipient_id TEXT NOT NULL,
    zone TEXT NOT NULL,
    state TEXT NOT NULL,
    plan_json TEXT NOT NULL,
    created_at DATETIME NOT NULL
);
"#;

const CREATE_INDICES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_reservations_cooldown
    ON reservations(item_id, recipient_id, scheduled_at);
CREATE INDEX IF NOT EXISTS idx_reservations_recipient
    ON reservations(recipient_id, active);
CREATE INDEX IF NOT EXISTS idx_item_usage_window
    ON item_usage(recipient_id, used_at);
CREATE INDEX IF NOT EXISTS idx_engagement_events_window
    ON engagement_events(recipient_id, occurred_at);
CREATE INDEX IF NOT EXISTS idx_schedule_plans_recipient
    ON schedule_plans(recipient_id, created_at);
"#;

/// Runs all required migrations. Safe to call at every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    pool.execute(CREATE_ITEM_STATS).await?;
    pool.execute(CREATE_RESERVATIONS).await?;
    pool.execute(CREATE_ITEM_USAGE).await?;
    pool.execute(CREATE_SATURATION_SNAPSHOTS).await?;
    pool.execute(CREATE_ENGAGEMENT_EVENTS).await?;
    pool.execute(CREATE_ENGAGEMENT_BASELINES).await?;
    pool.execute(CREATE_SCHEDULE_PLANS).await?;
    pool.execute(CREATE_INDICES).await?;

    Ok(())
}
