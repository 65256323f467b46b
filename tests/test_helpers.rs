// tests/test_helpers.rs

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use cadence::types::{
    AccountTier, BehavioralSegment, Item, ScheduleRequest, ValueTier,
};

/// In-memory pool sharing a single connection so every query sees the same
/// database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("create in-memory sqlite");
    cadence::store::migration::run_migrations(&pool)
        .await
        .expect("run migrations");
    pool
}

/// File-backed pool with real connection parallelism, for concurrency tests.
pub async fn file_pool(dir: &tempfile::TempDir, max_connections: u32) -> SqlitePool {
    let path = dir.path().join("cadence-test.db");
    let url = format!("sqlite://{}", path.display());
    cadence::store::connect(&url, max_connections)
        .await
        .expect("create file-backed sqlite")
}

pub fn period_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap()
}

pub fn item(id: i64, category: &str, tier: ValueTier) -> Item {
    Item {
        id,
        text: format!("caption {id}"),
        category: category.into(),
        tier,
        urgent: false,
    }
}

/// Catalog with `high` high-tier, `mid` mid-tier, and `filler` filler items,
/// ids starting at 1.
pub fn catalog(high: usize, mid: usize, filler: usize) -> Vec<Item> {
    let mut items = Vec::new();
    let mut id = 1;
    for _ in 0..high {
        items.push(item(id, "solo", ValueTier::High));
        id += 1;
    }
    for _ in 0..mid {
        items.push(item(id, "tease", ValueTier::Mid));
        id += 1;
    }
    for _ in 0..filler {
        items.push(item(id, "chat", ValueTier::Filler));
        id += 1;
    }
    items
}

pub fn request(recipient: &str, quotas: Vec<(ValueTier, usize)>) -> ScheduleRequest {
    ScheduleRequest {
        recipient_id: recipient.into(),
        period_start: period_start(),
        account_tier: AccountTier::Small,
        tier_quotas: quotas,
        segment: BehavioralSegment::Standard,
        segment_multiplier: 1.0,
        peak_hours: vec![],
        allow_partial: false,
    }
}

/// Seed a fresh saturation snapshot so the scheduler sees a known zone.
pub async fn seed_snapshot(pool: &SqlitePool, recipient: &str, zone: &str) {
    sqlx::query(
        r#"
        INSERT INTO saturation_snapshots (
            recipient_id, zone, exhaustion_score, volume_deviation,
            conversion_deviation, revenue_deviation, predicted_saturation,
            consecutive_decline_days, generated_at
        ) VALUES (?, ?, 0, 0, 0, 0, 0, 0, ?)
        ON CONFLICT (recipient_id) DO UPDATE SET
            zone = excluded.zone,
            generated_at = excluded.generated_at
        "#,
    )
    .bind(recipient)
    .bind(zone)
    .bind(Utc::now())
    .execute(pool)
    .await
    .expect("seed snapshot");
}

/// Seed one engagement-event rollup row.
pub async fn seed_event(
    pool: &SqlitePool,
    recipient: &str,
    occurred_at: DateTime<Utc>,
    sends: i64,
    conversions: i64,
    revenue: f64,
) {
    sqlx::query(
        r#"
        INSERT INTO engagement_events (recipient_id, occurred_at, sends, conversions, revenue)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(recipient)
    .bind(occurred_at)
    .bind(sends)
    .bind(conversions)
    .bind(revenue)
    .execute(pool)
    .await
    .expect("seed event");
}

/// Seed usage journal rows for budget-window tests.
pub async fn seed_usage(pool: &SqlitePool, recipient: &str, category: &str, count: usize) {
    for i in 0..count {
        sqlx::query(
            r#"
            INSERT INTO item_usage (recipient_id, item_id, category, tier, urgent, used_at)
            VALUES (?, ?, ?, 'mid', 0, ?)
            "#,
        )
        .bind(recipient)
        .bind(9000 + i as i64)
        .bind(category)
        .bind(Utc::now() - Duration::hours(i as i64 + 1))
        .execute(pool)
        .await
        .expect("seed usage");
    }
}
