// src/error.rs

//! Typed error taxonomy for the scheduling core.
//!
//! `Validation` rejects a malformed request before any side effect.
//! `Capacity` means a tier quota could not be filled from the eligible pool.
//! `Conflict` means a reservation lost the atomic check-and-insert race.
//! `Staleness` is always recovered locally (neutral zone) and logged, never fatal.

use crate::types::ValueTier;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("tier '{tier}' under quota for {recipient}: needed {needed}, eligible {available}")]
    Capacity {
        recipient: String,
        tier: ValueTier,
        needed: usize,
        available: usize,
    },

    #[error("reservation conflict for item {item_id} / recipient {recipient}: {reason}")]
    Conflict {
        recipient: String,
        item_id: i64,
        reason: String,
    },

    #[error("stale {what} for {recipient}")]
    Staleness { recipient: String, what: String },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

impl CoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
