// src/stats/mod.rs

//! Per-(item, recipient) observation store. The external feedback-ingestion
//! job writes counts and revenue; the selection path only reads.

pub mod confidence;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::error::CoreError;

/// Observation counts and revenue accumulators for one (item, recipient) pair.
#[derive(Debug, Clone, Default)]
pub struct ItemStats {
    pub item_id: i64,
    pub recipient_id: String,
    pub successes: i64,
    pub failures: i64,
    pub total_value: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub bound_lower: Option<f64>,
    pub bound_upper: Option<f64>,
    pub exploration_weight: Option<f64>,
}

impl ItemStats {
    pub fn observations(&self) -> i64 {
        self.successes + self.failures
    }

    /// Whether this pair has any historical performance signal at all.
    pub fn has_signal(&self) -> bool {
        self.observations() > 0
    }
}

pub struct StatsStore {
    pool: SqlitePool,
}

impl StatsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All stats rows for one recipient, keyed by item id.
    pub async fn for_recipient(
        &self,
        recipient_id: &str,
    ) -> Result<HashMap<i64, ItemStats>, CoreError> {
        let rows = sqlx::query(
            r#"
            SELECT item_id, recipient_id, successes, failures, total_value,
                   last_used_at, bound_lower, bound_upper, exploration_weight
            FROM item_stats
            WHERE recipient_id = ?
            "#,
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = HashMap::with_capacity(rows.len());
        for row in rows {
            let entry = ItemStats {
                item_id: row.get("item_id"),
                recipient_id: row.get("recipient_id"),
                successes: row.get("successes"),
                failures: row.get("failures"),
                total_value: row.get("total_value"),
                last_used_at: row.get("last_used_at"),
                bound_lower: row.get("bound_lower"),
                bound_upper: row.get("bound_upper"),
                exploration_weight: row.get("exploration_weight"),
            };
            stats.insert(entry.item_id, entry);
        }

        Ok(stats)
    }

    /// Upsert one stats row, refreshing the cached confidence bounds.
    /// Used by the feedback-ingestion path and by tests seeding fixtures.
    pub async fn upsert(&self, stats: &ItemStats) -> Result<(), CoreError> {
        let bounds = confidence::bounds(stats.successes, stats.failures)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO item_stats (
                item_id, recipient_id, successes, failures, total_value,
                last_used_at, bound_lower, bound_upper, exploration_weight, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (item_id, recipient_id) DO UPDATE SET
                successes = excluded.successes,
                failures = excluded.failures,
                total_value = excluded.total_value,
                last_used_at = excluded.last_used_at,
                bound_lower = excluded.bound_lower,
                bound_upper = excluded.bound_upper,
                exploration_weight = excluded.exploration_weight,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(stats.item_id)
        .bind(&stats.recipient_id)
        .bind(stats.successes)
        .bind(stats.failures)
        .bind(stats.total_value)
        .bind(stats.last_used_at)
        .bind(bounds.lower)
        .bind(bounds.upper)
        .bind(bounds.exploration_weight)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Aggregate 7-day-ish totals used for the composite engagement report.
    pub async fn aggregate_for_recipient(
        &self,
        recipient_id: &str,
    ) -> Result<StatsAggregate, CoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(successes), 0) AS successes,
                   COALESCE(SUM(failures), 0) AS failures,
                   COALESCE(SUM(total_value), 0.0) AS total_value,
                   COUNT(DISTINCT item_id) AS distinct_items
            FROM item_stats
            WHERE recipient_id = ?
            "#,
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(StatsAggregate {
            successes: row.get("successes"),
            failures: row.get("failures"),
            total_value: row.get("total_value"),
            distinct_items: row.get("distinct_items"),
        })
    }
}

/// Recipient-level rollup of the stats table.
#[derive(Debug, Clone, Copy)]
pub struct StatsAggregate {
    pub successes: i64,
    pub failures: i64,
    pub total_value: f64,
    pub distinct_items: i64,
}

impl StatsAggregate {
    pub fn sends(&self) -> i64 {
        self.successes + self.failures
    }

    pub fn conversion_rate(&self) -> f64 {
        if self.sends() == 0 {
            0.0
        } else {
            self.successes as f64 / self.sends() as f64
        }
    }

    pub fn revenue_per_send(&self) -> f64 {
        if self.sends() == 0 {
            0.0
        } else {
            self.total_value / self.sends() as f64
        }
    }
}
