// src/reservation/mod.rs

//! Atomic assignment locking. Every claim on an (item, recipient, slot) goes
//! through a guarded insert keyed by a deterministic idempotency key, so
//! concurrent schedulers can race freely and at most one wins.

pub mod sweep;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::error::CoreError;

/// Deterministic key for one claim. Two attempts to schedule the same item
/// to the same recipient in the same hour collapse to the same key.
pub fn idempotency_key(recipient_id: &str, item_id: i64, scheduled_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(recipient_id.as_bytes());
    hasher.update(b":");
    hasher.update(item_id.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(scheduled_at.format("%Y-%m-%d:%H").to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub item_id: i64,
    pub recipient_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub schedule_id: String,
    pub category: String,
    pub tier: String,
    pub urgent: bool,
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub idempotency_key: String,
    pub item_id: i64,
    pub recipient_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub schedule_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// New row inserted.
    Reserved,
    /// Same idempotency key already active. Safe to treat as success.
    Duplicate,
    /// Another active reservation holds this item for this recipient
    /// inside the cooldown window.
    Conflict,
}

/// Result of a batch commit. `rolled_back` means nothing was persisted.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub committed: Vec<i64>,
    pub rejected: Vec<(i64, String)>,
    pub rolled_back: bool,
}

impl BatchOutcome {
    pub fn conflict_rate(&self) -> f64 {
        let total = self.committed.len() + self.rejected.len();
        if total == 0 {
            0.0
        } else {
            self.rejected.len() as f64 / total as f64
        }
    }
}

pub struct AssignmentLocker {
    pool: SqlitePool,
    cooldown_days: i64,
    stale_days: i64,
}

impl AssignmentLocker {
    pub fn new(pool: SqlitePool, cooldown_days: i64, stale_days: i64) -> Self {
        Self {
            pool,
            cooldown_days,
            stale_days,
        }
    }

    /// Guarded check-and-insert on one connection. The NOT EXISTS subquery
    /// and the insert are a single statement, so two racing claims cannot
    /// both pass the guard. The statement is also the transaction's first
    /// write: the write lock is taken up front and racing claims serialize
    /// on the busy timeout instead of failing a snapshot upgrade.
    ///
    /// The guard ignores the claim's own key; a repeat of the exact same
    /// claim falls through to the key's unique constraint and reads as an
    /// idempotent duplicate.
    async fn try_reserve(
        &self,
        conn: &mut SqliteConnection,
        req: &ReservationRequest,
    ) -> Result<ReserveOutcome, CoreError> {
        let key = idempotency_key(&req.recipient_id, req.item_id, req.scheduled_at);

        let window_start = req.scheduled_at - Duration::days(self.cooldown_days);
        let window_end = req.scheduled_at + Duration::days(self.cooldown_days);
        let expires_at = req.scheduled_at + Duration::days(self.stale_days);

        let result = sqlx::query(
            r#"
            INSERT INTO reservations (
                idempotency_key, item_id, recipient_id, scheduled_at,
                created_at, expires_at, schedule_id, active
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, 1
            WHERE NOT EXISTS (
                SELECT 1 FROM reservations
                WHERE item_id = ? AND recipient_id = ? AND active = 1
                  AND idempotency_key <> ?
                  AND scheduled_at > ? AND scheduled_at < ?
            )
            "#,
        )
        .bind(&key)
        .bind(req.item_id)
        .bind(&req.recipient_id)
        .bind(req.scheduled_at)
        .bind(Utc::now())
        .bind(expires_at)
        .bind(&req.schedule_id)
        .bind(req.item_id)
        .bind(&req.recipient_id)
        .bind(&key)
        .bind(window_start)
        .bind(window_end)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(r) if r.rows_affected() == 1 => Ok(ReserveOutcome::Reserved),
            Ok(_) => Ok(ReserveOutcome::Conflict),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                debug!(recipient_id = %req.recipient_id, item_id = req.item_id, "duplicate reservation");
                Ok(ReserveOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Claim one slot. Each call is its own transaction; a lost race against
    /// an active reservation in the cooldown window is a `Conflict` error.
    pub async fn reserve(&self, req: &ReservationRequest) -> Result<ReserveOutcome, CoreError> {
        let mut tx = self.pool.begin().await?;
        let outcome = self.try_reserve(&mut tx, req).await?;
        tx.commit().await?;
        match outcome {
            ReserveOutcome::Conflict => Err(CoreError::Conflict {
                recipient: req.recipient_id.clone(),
                item_id: req.item_id,
                reason: "active reservation within cooldown window".to_string(),
            }),
            other => Ok(other),
        }
    }

    /// Commit a whole plan in one transaction. Conflicts within tolerance
    /// leave the rest of the batch committed; one over and everything rolls
    /// back with no side effects. Duplicates count as committed.
    pub async fn commit_batch(
        &self,
        requests: &[ReservationRequest],
        conflict_tolerance: usize,
    ) -> Result<BatchOutcome, CoreError> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BatchOutcome {
            committed: Vec::new(),
            rejected: Vec::new(),
            rolled_back: false,
        };

        for req in requests {
            match self.try_reserve(&mut tx, req).await? {
                ReserveOutcome::Reserved | ReserveOutcome::Duplicate => {
                    outcome.committed.push(req.item_id);
                }
                ReserveOutcome::Conflict => {
                    outcome.rejected.push((
                        req.item_id,
                        "active reservation within cooldown window".to_string(),
                    ));
                }
            }
        }

        if outcome.rejected.len() > conflict_tolerance {
            tx.rollback().await?;
            outcome.committed.clear();
            outcome.rolled_back = true;
            warn!(
                rejected = outcome.rejected.len(),
                conflict_tolerance, "batch rolled back"
            );
            return Ok(outcome);
        }

        // Usage journal rows ride the same transaction as the reservations.
        for req in requests {
            if outcome.committed.contains(&req.item_id) {
                sqlx::query(
                    r#"
                    INSERT INTO item_usage (recipient_id, item_id, category, tier, urgent, used_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&req.recipient_id)
                .bind(req.item_id)
                .bind(&req.category)
                .bind(&req.tier)
                .bind(req.urgent as i64)
                .bind(req.scheduled_at)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        info!(
            committed = outcome.committed.len(),
            rejected = outcome.rejected.len(),
            "batch committed"
        );
        Ok(outcome)
    }

    /// Item ids used for this recipient inside the cooldown window. Feeds
    /// the candidate pool filter.
    pub async fn recently_used(&self, recipient_id: &str) -> Result<HashSet<i64>, CoreError> {
        let since = Utc::now() - Duration::days(self.cooldown_days);
        let rows = sqlx::query(
            "SELECT DISTINCT item_id FROM item_usage WHERE recipient_id = ? AND used_at >= ?",
        )
        .bind(recipient_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("item_id")).collect())
    }

    /// Active reservations for one recipient, soonest first.
    pub async fn active_for_recipient(
        &self,
        recipient_id: &str,
    ) -> Result<Vec<Reservation>, CoreError> {
        let rows = sqlx::query(
            r#"
            SELECT idempotency_key, item_id, recipient_id, scheduled_at, expires_at, schedule_id
            FROM reservations
            WHERE recipient_id = ? AND active = 1
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Reservation {
                idempotency_key: row.get("idempotency_key"),
                item_id: row.get("item_id"),
                recipient_id: row.get("recipient_id"),
                scheduled_at: row.get("scheduled_at"),
                expires_at: row.get("expires_at"),
                schedule_id: row.get("schedule_id"),
            })
            .collect())
    }

    /// Release every active reservation belonging to an abandoned plan.
    pub async fn release_schedule(&self, schedule_id: &str) -> Result<u64, CoreError> {
        let result =
            sqlx::query("UPDATE reservations SET active = 0 WHERE schedule_id = ? AND active = 1")
                .bind(schedule_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
