// src/saturation/baseline.rs

//! Hour-of-day/day-of-week baselines backing the deviation math. Rows are
//! normally written by the external baseline provider; `rebuild` exists for
//! installs that run without one.

use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Copy)]
pub struct Baseline {
    pub mean: f64,
    pub stddev: f64,
}

/// z-score against an optional baseline. Missing or degenerate baselines
/// read as neutral, never an error.
pub fn z_score(observed: f64, baseline: Option<Baseline>) -> f64 {
    match baseline {
        Some(b) if b.stddev > 0.0 => (observed - b.mean) / b.stddev,
        _ => 0.0,
    }
}

pub struct BaselineStore {
    pool: SqlitePool,
}

impl BaselineStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        recipient_id: &str,
        hour_of_day: u32,
        day_of_week: u32,
        metric: &str,
    ) -> Result<Option<Baseline>> {
        let row = sqlx::query(
            r#"
            SELECT mean, stddev FROM engagement_baselines
            WHERE recipient_id = ? AND hour_of_day = ? AND day_of_week = ? AND metric = ?
            "#,
        )
        .bind(recipient_id)
        .bind(hour_of_day)
        .bind(day_of_week)
        .bind(metric)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Baseline {
            mean: r.get("mean"),
            stddev: r.get("stddev"),
        }))
    }

    pub async fn upsert(
        &self,
        recipient_id: &str,
        hour_of_day: u32,
        day_of_week: u32,
        metric: &str,
        baseline: Baseline,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO engagement_baselines (recipient_id, hour_of_day, day_of_week, metric, mean, stddev)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (recipient_id, hour_of_day, day_of_week, metric) DO UPDATE SET
                mean = excluded.mean,
                stddev = excluded.stddev
            "#,
        )
        .bind(recipient_id)
        .bind(hour_of_day)
        .bind(day_of_week)
        .bind(metric)
        .bind(baseline.mean)
        .bind(baseline.stddev)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Expected full-day total for a volume-like metric, aggregated across
    /// the hour/day grid. Mean is the average daily sum over days of week;
    /// variance sums across hours. `None` when no baseline rows exist.
    pub async fn daily_aggregate(&self, recipient_id: &str, metric: &str) -> Result<Option<Baseline>> {
        let rows = sqlx::query(
            r#"
            SELECT SUM(mean) AS day_mean, SUM(stddev * stddev) AS day_var
            FROM engagement_baselines
            WHERE recipient_id = ? AND metric = ?
            GROUP BY day_of_week
            "#,
        )
        .bind(recipient_id)
        .bind(metric)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let n = rows.len() as f64;
        let mut mean = 0.0;
        let mut var = 0.0;
        for row in &rows {
            let day_mean: f64 = row.get("day_mean");
            let day_var: f64 = row.get("day_var");
            mean += day_mean;
            var += day_var;
        }

        Ok(Some(Baseline {
            mean: mean / n,
            stddev: (var / n).max(0.0).sqrt(),
        }))
    }

    /// Typical value for a rate-like metric, averaged across the grid.
    pub async fn rate_aggregate(&self, recipient_id: &str, metric: &str) -> Result<Option<Baseline>> {
        let row = sqlx::query(
            r#"
            SELECT AVG(mean) AS mean, AVG(stddev) AS stddev, COUNT(*) AS n
            FROM engagement_baselines
            WHERE recipient_id = ? AND metric = ?
            "#,
        )
        .bind(recipient_id)
        .bind(metric)
        .fetch_one(&self.pool)
        .await?;

        let n: i64 = row.get("n");
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(Baseline {
            mean: row.get("mean"),
            stddev: row.get("stddev"),
        }))
    }

    /// Recompute hour/day baselines from the raw event rollups over the
    /// lookback window. Stddev uses the population formula; a single sample
    /// yields stddev 0, which downstream reads as neutral.
    pub async fn rebuild(&self, recipient_id: &str, lookback_days: i64) -> Result<()> {
        let since = Utc::now() - Duration::days(lookback_days);

        for (metric, expr) in [
            ("volume", "CAST(sends AS REAL)"),
            (
                "conversion",
                "CASE WHEN sends > 0 THEN CAST(conversions AS REAL) / sends ELSE 0 END",
            ),
            ("revenue", "revenue"),
        ] {
            let sql = format!(
                r#"
                SELECT CAST(strftime('%H', occurred_at) AS INTEGER) AS hour_of_day,
                       CAST(strftime('%w', occurred_at) AS INTEGER) AS day_of_week,
                       AVG(v) AS mean,
                       AVG(v * v) AS mean_sq,
                       COUNT(*) AS samples
                FROM (
                    SELECT occurred_at, {expr} AS v
                    FROM engagement_events
                    WHERE recipient_id = ? AND occurred_at >= ?
                )
                GROUP BY hour_of_day, day_of_week
                "#
            );

            let rows = sqlx::query(&sql)
                .bind(recipient_id)
                .bind(since)
                .fetch_all(&self.pool)
                .await?;

            for row in rows {
                let hour: i64 = row.get("hour_of_day");
                let dow: i64 = row.get("day_of_week");
                let mean: f64 = row.get("mean");
                let mean_sq: f64 = row.get("mean_sq");
                let samples: i64 = row.get("samples");
                let stddev = if samples > 1 {
                    (mean_sq - mean * mean).max(0.0).sqrt()
                } else {
                    0.0
                };

                self.upsert(recipient_id, hour as u32, dow as u32, metric, Baseline { mean, stddev })
                    .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_is_neutral_without_baseline() {
        assert_eq!(z_score(5.0, None), 0.0);
        assert_eq!(
            z_score(5.0, Some(Baseline { mean: 2.0, stddev: 0.0 })),
            0.0
        );
    }

    #[test]
    fn z_measures_deviation() {
        let b = Some(Baseline { mean: 10.0, stddev: 2.0 });
        assert_eq!(z_score(14.0, b), 2.0);
        assert_eq!(z_score(6.0, b), -2.0);
    }
}
