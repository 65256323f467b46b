// tests/schedule_e2e.rs

mod test_helpers;

use chrono::{Duration, Timelike};
use std::collections::HashSet;

use cadence::alerts::AlertBus;
use cadence::config::EngineConfig;
use cadence::error::CoreError;
use cadence::scheduler::{ScheduleState, Scheduler};
use cadence::stats::{ItemStats, StatsStore};
use cadence::types::ValueTier;
use test_helpers::*;

fn scheduler(pool: &sqlx::SqlitePool) -> Scheduler {
    Scheduler::new(pool.clone(), EngineConfig::default(), AlertBus::default())
}

fn gaps_ok(slots: &[cadence::types::PlannedSlot], min_gap_minutes: i64) -> bool {
    let mut times: Vec<_> = slots.iter().map(|s| s.slot_time).collect();
    times.sort();
    times
        .windows(2)
        .all(|w| w[1] - w[0] >= Duration::minutes(min_gap_minutes))
}

#[tokio::test]
async fn cold_start_green_plan_commits_fully() {
    let pool = memory_pool().await;
    seed_snapshot(&pool, "r1", "green").await;
    let scheduler = scheduler(&pool);

    // No stats at all: every item is an unknown and sampling must not panic.
    let items = catalog(8, 6, 4);
    let request = request(
        "r1",
        vec![
            (ValueTier::High, 5),
            (ValueTier::Mid, 3),
            (ValueTier::Filler, 2),
        ],
    );

    let outcome = scheduler
        .build_and_commit(&request, &items, &[])
        .await
        .unwrap();

    assert_eq!(outcome.state, ScheduleState::Done);
    assert_eq!(outcome.plan.slots.len(), 10);
    assert!(outcome.rejected.is_empty());

    // All distinct items, quotas honored per tier.
    let ids: HashSet<i64> = outcome.plan.slots.iter().map(|s| s.item_id).collect();
    assert_eq!(ids.len(), 10);
    let count = |t| outcome.plan.slots.iter().filter(|s| s.tier == t).count();
    assert_eq!(count(ValueTier::High), 5);
    assert_eq!(count(ValueTier::Mid), 3);
    assert_eq!(count(ValueTier::Filler), 2);

    // Small account in a green zone keeps the 150-minute gap.
    assert!(gaps_ok(&outcome.plan.slots, 150));

    // Every slot is backed by an active reservation.
    let active = scheduler.locker().active_for_recipient("r1").await.unwrap();
    assert_eq!(active.len(), 10);
}

#[tokio::test]
async fn missing_snapshot_degrades_to_yellow_throttle() {
    let pool = memory_pool().await;
    let scheduler = scheduler(&pool);

    let items = catalog(8, 6, 4);
    let request = request("r1", vec![(ValueTier::High, 4), (ValueTier::Filler, 2)]);

    let plan = scheduler.build_plan(&request, &items, &[]).await.unwrap();

    // Yellow scales 4 -> 3 and widens the gap to 180 minutes.
    let high = plan.slots.iter().filter(|s| s.tier == ValueTier::High).count();
    assert_eq!(high, 3);
    assert!(gaps_ok(&plan.slots, 180));
}

#[tokio::test]
async fn red_zone_front_loads_filler_cooldown() {
    let pool = memory_pool().await;
    seed_snapshot(&pool, "r1", "red").await;
    let scheduler = scheduler(&pool);

    let items = catalog(8, 0, 6);
    let request = request("r1", vec![(ValueTier::High, 4), (ValueTier::Filler, 2)]);

    let plan = scheduler.build_plan(&request, &items, &[]).await.unwrap();

    let mut slots = plan.slots.clone();
    slots.sort_by_key(|s| s.slot_time);

    // Leading cooldown days carry only filler.
    let first_paid = slots.iter().position(|s| s.tier != ValueTier::Filler).unwrap();
    assert!(first_paid > 0);
    for slot in &slots[..first_paid] {
        assert_eq!(slot.tier, ValueTier::Filler);
    }
    let cooldown_end = period_start().date_naive() + Duration::days(2);
    assert!(slots[first_paid].slot_time.date_naive() >= cooldown_end);

    // Volume halved, gap widened to 150 + 60.
    let high = slots.iter().filter(|s| s.tier == ValueTier::High).count();
    assert_eq!(high, 2);
    assert!(gaps_ok(&slots, 210));
}

#[tokio::test]
async fn under_quota_without_allow_partial_is_a_capacity_error() {
    let pool = memory_pool().await;
    seed_snapshot(&pool, "r1", "green").await;
    let scheduler = scheduler(&pool);

    // Only 2 high items for a quota of 5.
    let items = catalog(2, 0, 0);
    let request = request("r1", vec![(ValueTier::High, 5)]);

    let err = scheduler.build_plan(&request, &items, &[]).await.unwrap_err();
    match err {
        CoreError::Capacity {
            recipient,
            tier,
            needed,
            available,
        } => {
            assert_eq!(recipient, "r1");
            assert_eq!(tier, ValueTier::High);
            assert_eq!(needed, 5);
            assert_eq!(available, 2);
        }
        other => panic!("expected capacity error, got {other}"),
    }
}

#[tokio::test]
async fn allow_partial_takes_what_exists() {
    let pool = memory_pool().await;
    seed_snapshot(&pool, "r1", "green").await;
    let scheduler = scheduler(&pool);

    let items = catalog(2, 0, 0);
    let mut request = request("r1", vec![(ValueTier::High, 5)]);
    request.allow_partial = true;

    let outcome = scheduler.build_and_commit(&request, &items, &[]).await.unwrap();
    assert_eq!(outcome.plan.slots.len(), 2);
    assert_eq!(outcome.state, ScheduleState::Done);
}

#[tokio::test]
async fn saturated_category_is_budget_excluded() {
    let pool = memory_pool().await;
    seed_snapshot(&pool, "r1", "green").await;
    // 20 sends in "solo" this week: the category is at its cap.
    seed_usage(&pool, "r1", "solo", 20).await;
    let scheduler = scheduler(&pool);

    // All high items are in the saturated category.
    let items = catalog(5, 0, 0);
    let request = request("r1", vec![(ValueTier::High, 2)]);

    let err = scheduler.build_plan(&request, &items, &[]).await.unwrap_err();
    assert!(matches!(err, CoreError::Capacity { available: 0, .. }));
}

#[tokio::test]
async fn proven_items_crowd_out_unknowns_when_pool_allows() {
    let pool = memory_pool().await;
    seed_snapshot(&pool, "r1", "green").await;
    let scheduler = scheduler(&pool);
    let stats = StatsStore::new(pool.clone());

    // 8 high items, 6 with history. Floor is 5, so unknowns are filtered.
    let items = catalog(8, 0, 0);
    for id in 1..=6 {
        stats
            .upsert(&ItemStats {
                item_id: id,
                recipient_id: "r1".into(),
                successes: 5,
                failures: 5,
                total_value: 40.0,
                last_used_at: None,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let request = request("r1", vec![(ValueTier::High, 5)]);
    let plan = scheduler.build_plan(&request, &items, &[]).await.unwrap();

    let ids: HashSet<i64> = plan.slots.iter().map(|s| s.item_id).collect();
    assert_eq!(ids.len(), 5);
    assert!(ids.iter().all(|id| (1..=6).contains(id)));
}

#[tokio::test]
async fn storage_failure_surfaces_as_storage_error() {
    let pool = memory_pool().await;
    seed_snapshot(&pool, "r1", "green").await;
    let scheduler = scheduler(&pool);
    pool.close().await;

    let items = catalog(2, 0, 0);
    let request = request("r1", vec![(ValueTier::High, 1)]);
    let err = scheduler.build_plan(&request, &items, &[]).await.unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));
}

#[tokio::test]
async fn committed_plan_is_persisted() {
    let pool = memory_pool().await;
    seed_snapshot(&pool, "r1", "green").await;
    let scheduler = scheduler(&pool);

    let items = catalog(4, 0, 0);
    let request = request("r1", vec![(ValueTier::High, 2)]);
    let outcome = scheduler.build_and_commit(&request, &items, &[]).await.unwrap();

    let row = sqlx::query("SELECT state, plan_json FROM schedule_plans WHERE schedule_id = ?")
        .bind(&outcome.plan.schedule_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    let state: String = sqlx::Row::get(&row, "state");
    let plan_json: String = sqlx::Row::get(&row, "plan_json");
    assert_eq!(state, "done");

    let slots: Vec<cadence::types::PlannedSlot> = serde_json::from_str(&plan_json).unwrap();
    assert_eq!(slots.len(), 2);
}

#[tokio::test]
async fn peak_hours_are_honored() {
    let pool = memory_pool().await;
    seed_snapshot(&pool, "r1", "green").await;
    let scheduler = scheduler(&pool);

    let items = catalog(6, 0, 0);
    let mut request = request("r1", vec![(ValueTier::High, 4)]);
    request.peak_hours = vec![11, 15, 20];

    let plan = scheduler.build_plan(&request, &items, &[]).await.unwrap();
    assert!(plan
        .slots
        .iter()
        .all(|s| request.peak_hours.contains(&s.slot_time.hour())));
    assert!(gaps_ok(&plan.slots, 150));
}
