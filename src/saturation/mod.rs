// src/saturation/mod.rs

//! Audience fatigue monitor. Compares rolling engagement windows against
//! hour-of-day/day-of-week baselines and classifies each recipient into a
//! traffic-light zone. Advisory only: schedulers read the cached snapshot
//! and a stale or missing one degrades to YELLOW, never an error on the
//! scheduling path.

pub mod baseline;
pub mod engagement;

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::error::CoreError;
use baseline::{BaselineStore, z_score};

const ANOMALY_Z: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Green,
    Yellow,
    Red,
    Unknown,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Green => "green",
            Zone::Yellow => "yellow",
            Zone::Red => "red",
            Zone::Unknown => "unknown",
        }
    }

    /// The zone schedulers act on. Unknown is indistinguishable from mild
    /// fatigue, so it throttles the same way.
    pub fn effective(&self) -> Zone {
        match self {
            Zone::Unknown => Zone::Yellow,
            z => *z,
        }
    }
}

impl std::str::FromStr for Zone {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "green" => Ok(Zone::Green),
            "yellow" => Ok(Zone::Yellow),
            "red" => Ok(Zone::Red),
            "unknown" => Ok(Zone::Unknown),
            other => Err(CoreError::Validation(format!("unknown zone: {other}"))),
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify from conversion and volume ratios against baseline.
/// `None` ratios mean no usable baseline and yield Unknown.
pub fn classify(conv_ratio: Option<f64>, vol_ratio: Option<f64>) -> Zone {
    match (conv_ratio, vol_ratio) {
        (Some(c), Some(v)) if c < 0.5 && v > 1.5 => Zone::Red,
        (Some(c), Some(v)) if c < 0.7 && v > 1.2 => Zone::Yellow,
        (Some(c), _) if c >= 0.9 => Zone::Green,
        _ => Zone::Unknown,
    }
}

/// Exhaustion score on [0, 100]. Missing ratios read as neutral (1.0).
pub fn exhaustion_score(conv_ratio: Option<f64>, vol_ratio: Option<f64>, decline_days: i64) -> f64 {
    let c = conv_ratio.unwrap_or(1.0);
    let v = vol_ratio.unwrap_or(1.0);
    ((1.0 - c) * 50.0 + (v - 1.0) * 30.0 + decline_days as f64 * 10.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone)]
pub struct SaturationSnapshot {
    pub recipient_id: String,
    pub zone: Zone,
    pub exhaustion_score: f64,
    pub volume_deviation: f64,
    pub conversion_deviation: f64,
    pub revenue_deviation: f64,
    pub predicted_saturation: bool,
    pub consecutive_decline_days: i64,
    pub generated_at: DateTime<Utc>,
}

/// One rolling window of engagement rollups.
#[derive(Debug, Clone, Copy, Default)]
struct WindowMetrics {
    sends: i64,
    conversions: i64,
    revenue: f64,
}

impl WindowMetrics {
    fn conversion_rate(&self) -> f64 {
        if self.sends == 0 {
            0.0
        } else {
            self.conversions as f64 / self.sends as f64
        }
    }
}

pub struct SaturationMonitor {
    pool: SqlitePool,
    baselines: BaselineStore,
    max_age: Duration,
}

impl SaturationMonitor {
    pub fn new(pool: SqlitePool, snapshot_max_age_secs: u64) -> Self {
        Self {
            baselines: BaselineStore::new(pool.clone()),
            pool,
            max_age: Duration::seconds(snapshot_max_age_secs as i64),
        }
    }

    pub fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    async fn window(&self, recipient_id: &str, hours: i64) -> Result<WindowMetrics> {
        let since = Utc::now() - Duration::hours(hours);
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(sends), 0) AS sends,
                   COALESCE(SUM(conversions), 0) AS conversions,
                   COALESCE(SUM(revenue), 0.0) AS revenue
            FROM engagement_events
            WHERE recipient_id = ? AND occurred_at >= ?
            "#,
        )
        .bind(recipient_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(WindowMetrics {
            sends: row.get("sends"),
            conversions: row.get("conversions"),
            revenue: row.get("revenue"),
        })
    }

    /// Consecutive days of strictly declining daily conversions, counted
    /// backwards from the most recent day with data.
    async fn decline_days(&self, recipient_id: &str) -> Result<i64> {
        let since = Utc::now() - Duration::days(8);
        let rows = sqlx::query(
            r#"
            SELECT date(occurred_at) AS day, SUM(conversions) AS conversions
            FROM engagement_events
            WHERE recipient_id = ? AND occurred_at >= ?
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(recipient_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let series: Vec<i64> = rows.iter().map(|r| r.get("conversions")).collect();
        Ok(count_trailing_declines(&series))
    }

    /// Recompute the snapshot for one recipient and persist it.
    pub async fn evaluate(&self, recipient_id: &str) -> Result<SaturationSnapshot> {
        let now = Utc::now();
        let hour = self.window(recipient_id, 1).await?;
        let day = self.window(recipient_id, 24).await?;
        let week = self.window(recipient_id, 24 * 7).await?;

        let base_vol = self.baselines.daily_aggregate(recipient_id, "volume").await?;
        let base_conv = self.baselines.rate_aggregate(recipient_id, "conversion").await?;
        let base_rev = self.baselines.daily_aggregate(recipient_id, "revenue").await?;

        let vol_ratio = base_vol
            .filter(|b| b.mean > 0.0)
            .map(|b| day.sends as f64 / b.mean);
        let conv_ratio = base_conv
            .filter(|b| b.mean > 0.0)
            .map(|b| day.conversion_rate() / b.mean);

        let z_vol = z_score(day.sends as f64, base_vol);
        let z_conv = z_score(day.conversion_rate(), base_conv);
        let z_rev = z_score(day.revenue, base_rev);

        // Short-horizon spike check: the trailing hour against this exact
        // hour-of-day/day-of-week cell.
        let hour_base = self
            .baselines
            .get(
                recipient_id,
                now.hour(),
                now.weekday().num_days_from_sunday(),
                "volume",
            )
            .await?;
        let z_hour = z_score(hour.sends as f64, hour_base);

        for (name, z) in [
            ("hourly_volume", z_hour),
            ("volume", z_vol),
            ("conversion", z_conv),
            ("revenue", z_rev),
        ] {
            if z.abs() > ANOMALY_Z {
                warn!(recipient_id, metric = name, z, "engagement anomaly");
            }
        }

        let decline_days = self.decline_days(recipient_id).await?;
        let zone = classify(conv_ratio, vol_ratio);
        let predicted = (z_conv < -2.0 && z_vol > 2.0) || decline_days >= 3;

        let snapshot = SaturationSnapshot {
            recipient_id: recipient_id.to_string(),
            zone,
            exhaustion_score: exhaustion_score(conv_ratio, vol_ratio, decline_days),
            volume_deviation: z_vol,
            conversion_deviation: z_conv,
            revenue_deviation: z_rev,
            predicted_saturation: predicted,
            consecutive_decline_days: decline_days,
            generated_at: now,
        };

        debug!(
            recipient_id,
            zone = %snapshot.zone,
            score = snapshot.exhaustion_score,
            week_sends = week.sends,
            "saturation snapshot refreshed"
        );

        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    async fn persist(&self, snapshot: &SaturationSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saturation_snapshots (
                recipient_id, zone, exhaustion_score, volume_deviation,
                conversion_deviation, revenue_deviation, predicted_saturation,
                consecutive_decline_days, generated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (recipient_id) DO UPDATE SET
                zone = excluded.zone,
                exhaustion_score = excluded.exhaustion_score,
                volume_deviation = excluded.volume_deviation,
                conversion_deviation = excluded.conversion_deviation,
                revenue_deviation = excluded.revenue_deviation,
                predicted_saturation = excluded.predicted_saturation,
                consecutive_decline_days = excluded.consecutive_decline_days,
                generated_at = excluded.generated_at
            "#,
        )
        .bind(&snapshot.recipient_id)
        .bind(snapshot.zone.as_str())
        .bind(snapshot.exhaustion_score)
        .bind(snapshot.volume_deviation)
        .bind(snapshot.conversion_deviation)
        .bind(snapshot.revenue_deviation)
        .bind(snapshot.predicted_saturation as i64)
        .bind(snapshot.consecutive_decline_days)
        .bind(snapshot.generated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Latest stored snapshot, regardless of age.
    pub async fn latest(
        &self,
        recipient_id: &str,
    ) -> Result<Option<SaturationSnapshot>, CoreError> {
        let row = sqlx::query(
            r#"
            SELECT recipient_id, zone, exhaustion_score, volume_deviation,
                   conversion_deviation, revenue_deviation, predicted_saturation,
                   consecutive_decline_days, generated_at
            FROM saturation_snapshots
            WHERE recipient_id = ?
            "#,
        )
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let zone: String = row.get("zone");
        let predicted: i64 = row.get("predicted_saturation");

        Ok(Some(SaturationSnapshot {
            recipient_id: row.get("recipient_id"),
            zone: zone.parse().unwrap_or(Zone::Unknown),
            exhaustion_score: row.get("exhaustion_score"),
            volume_deviation: row.get("volume_deviation"),
            conversion_deviation: row.get("conversion_deviation"),
            revenue_deviation: row.get("revenue_deviation"),
            predicted_saturation: predicted != 0,
            consecutive_decline_days: row.get("consecutive_decline_days"),
            generated_at: row.get("generated_at"),
        }))
    }

    /// Latest snapshot, erroring when missing or older than the freshness
    /// window. For callers that must not act on stale data.
    pub async fn require_fresh(&self, recipient_id: &str) -> Result<SaturationSnapshot, CoreError> {
        let snapshot = self.latest(recipient_id).await?;

        match snapshot {
            Some(s) if Utc::now() - s.generated_at <= self.max_age => Ok(s),
            Some(_) => Err(CoreError::Staleness {
                recipient: recipient_id.to_string(),
                what: "saturation snapshot past freshness window".to_string(),
            }),
            None => Err(CoreError::Staleness {
                recipient: recipient_id.to_string(),
                what: "no saturation snapshot".to_string(),
            }),
        }
    }

    /// Zone for the scheduling path. Stale or missing snapshots degrade to
    /// YELLOW with a warning.
    pub async fn zone_for_scheduling(&self, recipient_id: &str) -> Result<Zone, CoreError> {
        match self.latest(recipient_id).await? {
            Some(s) if Utc::now() - s.generated_at <= self.max_age => Ok(s.zone.effective()),
            Some(s) => {
                warn!(recipient_id, age_secs = (Utc::now() - s.generated_at).num_seconds(),
                    "saturation snapshot stale, assuming yellow");
                Ok(Zone::Yellow)
            }
            None => {
                warn!(recipient_id, "no saturation snapshot, assuming yellow");
                Ok(Zone::Yellow)
            }
        }
    }
}

fn count_trailing_declines(daily: &[i64]) -> i64 {
    let mut declines = 0;
    for pair in daily.windows(2).rev() {
        if pair[1] < pair[0] {
            declines += 1;
        } else {
            break;
        }
    }
    declines
}
