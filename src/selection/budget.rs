// src/selection/budget.rs

//! Rolling-window send budgets. Usage counts come from the usage journal;
//! the penalty curve itself is pure so the scorer can call it per candidate.

use chrono::{Duration, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::error::CoreError;

/// Window caps enforced per recipient. Defaults follow the engine config.
#[derive(Debug, Clone, Copy)]
pub struct BudgetCaps {
    pub max_urgent: i64,
    pub max_per_category: i64,
    pub window_days: i64,
}

impl Default for BudgetCaps {
    fn default() -> Self {
        Self {
            max_urgent: 5,
            max_per_category: 20,
            window_days: 7,
        }
    }
}

/// Usage observed inside the rolling window for one recipient.
#[derive(Debug, Clone, Default)]
pub struct WindowUsage {
    pub urgent_count: i64,
    pub per_category: HashMap<String, i64>,
    pub categories_seen: Vec<String>,
    pub tiers_seen: Vec<String>,
    pub any_urgent: bool,
}

/// Penalty for one usage count against its cap.
///
/// At or above the cap the penalty is -1.0, which the scorer treats as a
/// hard exclusion. Approaching the cap ramps the penalty so saturated
/// categories lose ground before they hit the wall.
fn cap_penalty(usage: i64, cap: i64, near_cap_penalty: f64) -> f64 {
    if cap <= 0 {
        return -1.0;
    }
    let ratio = usage as f64 / cap as f64;
    if ratio >= 1.0 {
        -1.0
    } else if ratio >= 0.8 {
        near_cap_penalty
    } else if ratio >= 0.6 {
        -0.15
    } else {
        0.0
    }
}

/// Budget penalty for a candidate. Urgent items answer to both the urgent
/// cap and their category cap; the harsher one wins.
pub fn penalty(usage: &WindowUsage, caps: &BudgetCaps, category: &str, urgent: bool) -> f64 {
    let category_count = usage.per_category.get(category).copied().unwrap_or(0);
    let category_penalty = cap_penalty(category_count, caps.max_per_category, -0.3);

    if urgent {
        let urgent_penalty = cap_penalty(usage.urgent_count, caps.max_urgent, -0.5);
        urgent_penalty.min(category_penalty)
    } else {
        category_penalty
    }
}

pub struct BudgetTracker {
    pool: SqlitePool,
    caps: BudgetCaps,
}

impl BudgetTracker {
    pub fn new(pool: SqlitePool, caps: BudgetCaps) -> Self {
        Self { pool, caps }
    }

    pub fn caps(&self) -> &BudgetCaps {
        &self.caps
    }

    /// Load window usage for one recipient from the usage journal.
    pub async fn window_usage(&self, recipient_id: &str) -> Result<WindowUsage, CoreError> {
        let since = Utc::now() - Duration::days(self.caps.window_days);

        let rows = sqlx::query(
            r#"
            SELECT category, tier, urgent
            FROM item_usage
            WHERE recipient_id = ? AND used_at >= ?
            "#,
        )
        .bind(recipient_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut usage = WindowUsage::default();
        for row in rows {
            let category: String = row.get("category");
            let tier: String = row.get("tier");
            let urgent: i64 = row.get("urgent");

            *usage.per_category.entry(category.clone()).or_insert(0) += 1;
            if !usage.categories_seen.contains(&category) {
                usage.categories_seen.push(category);
            }
            if !usage.tiers_seen.contains(&tier) {
                usage.tiers_seen.push(tier);
            }
            if urgent != 0 {
                usage.urgent_count += 1;
                usage.any_urgent = true;
            }
        }

        Ok(usage)
    }
}
