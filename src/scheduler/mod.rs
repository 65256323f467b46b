// src/scheduler/mod.rs

//! Per-recipient plan construction. A plan walks
//! PENDING -> SIZING -> SELECTING -> SLOTTING -> COMMITTING and lands on
//! DONE, PARTIAL, or FAILED. Everything before COMMITTING is side-effect
//! free, so a caller can build a plan, inspect it, and walk away.

pub mod sizing;
pub mod slotting;

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts::{AlertBus, AlertEvent, Severity};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::reservation::{AssignmentLocker, ReservationRequest};
use crate::saturation::{SaturationMonitor, Zone};
use crate::selection::{
    self, BudgetCaps, BudgetTracker, RecentUsage, Ranked, ScoreInputs, budget,
};
use crate::stats::{ItemStats, StatsStore, confidence};
use crate::types::{Item, RestrictionSet, SchedulePlan, ScheduleRequest, ValueTier};

use slotting::SelectedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Pending,
    Sizing,
    Selecting,
    Slotting,
    Committing,
    Done,
    Partial,
    Failed,
}

impl ScheduleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sizing => "sizing",
            Self::Selecting => "selecting",
            Self::Slotting => "slotting",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

/// Final result of one scheduling run.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub plan: SchedulePlan,
    pub state: ScheduleState,
    /// Per-item rejection reasons from the commit step.
    pub rejected: Vec<(i64, String)>,
}

pub struct Scheduler {
    pool: SqlitePool,
    config: EngineConfig,
    stats: StatsStore,
    budget: BudgetTracker,
    locker: AssignmentLocker,
    monitor: SaturationMonitor,
    alerts: AlertBus,
}

impl Scheduler {
    pub fn new(pool: SqlitePool, config: EngineConfig, alerts: AlertBus) -> Self {
        let caps = BudgetCaps {
            max_urgent: config.max_urgent_per_window,
            max_per_category: config.max_per_category,
            window_days: config.budget_window_days,
        };
        Self {
            stats: StatsStore::new(pool.clone()),
            budget: BudgetTracker::new(pool.clone(), caps),
            locker: AssignmentLocker::new(
                pool.clone(),
                config.cooldown_days,
                config.reservation_stale_days,
            ),
            monitor: SaturationMonitor::new(pool.clone(), config.snapshot_max_age_secs as u64),
            alerts,
            pool,
            config,
        }
    }

    pub fn monitor(&self) -> &SaturationMonitor {
        &self.monitor
    }

    pub fn locker(&self) -> &AssignmentLocker {
        &self.locker
    }

    /// SIZING + SELECTING + SLOTTING. No writes; the returned plan is only a
    /// proposal until `commit` runs.
    pub async fn build_plan(
        &self,
        request: &ScheduleRequest,
        items: &[Item],
        restrictions: &[RestrictionSet],
    ) -> Result<SchedulePlan, CoreError> {
        let zone = self.monitor.zone_for_scheduling(&request.recipient_id).await?;
        let sizing = sizing::size(request, zone);
        info!(
            recipient_id = %request.recipient_id,
            zone = %zone,
            slots = sizing.total_slots(),
            gap_minutes = sizing.min_gap_minutes,
            "plan sized"
        );

        let stats = self.stats.for_recipient(&request.recipient_id).await?;
        let recently_used = self.locker.recently_used(&request.recipient_id).await?;
        let usage = self.budget.window_usage(&request.recipient_id).await?;

        let pool = selection::build_pool(
            &request.recipient_id,
            items,
            restrictions,
            &recently_used,
            &stats,
            self.config.min_pool_floor,
        );

        let recent = RecentUsage {
            categories: usage.categories_seen.iter().cloned().collect(),
            tiers: usage.tiers_seen.iter().cloned().collect(),
            any_urgent: usage.any_urgent,
        };

        // Revenue-per-use normalization spans the whole pool.
        let max_rpu = pool
            .iter()
            .filter_map(|c| stats.get(&c.item.id))
            .filter(|s| s.observations() > 0)
            .map(|s| s.total_value / s.observations() as f64)
            .fold(0.0_f64, f64::max);

        let mut rng = rand::rng();
        let mut picked: HashSet<i64> = HashSet::new();
        let mut selected: Vec<SelectedItem> = Vec::new();

        for &(tier, quota) in &sizing.quotas {
            if quota == 0 {
                continue;
            }
            let taken = self.select_for_tier(
                request, tier, quota, &pool, &stats, &usage, &recent, max_rpu, &mut picked,
                &mut rng,
            )?;
            selected.extend(taken);
        }

        let slots = slotting::assign_slots(
            selected,
            request.period_start,
            sizing.min_gap_minutes,
            &request.peak_hours,
            sizing.cooldown_days,
            sizing.max_per_day,
        );

        Ok(SchedulePlan {
            schedule_id: Uuid::new_v4().to_string(),
            recipient_id: request.recipient_id.clone(),
            zone,
            slots,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn select_for_tier<R: Rng>(
        &self,
        request: &ScheduleRequest,
        tier: ValueTier,
        quota: usize,
        pool: &[selection::Candidate],
        stats: &std::collections::HashMap<i64, ItemStats>,
        usage: &budget::WindowUsage,
        recent: &RecentUsage,
        max_rpu: f64,
        picked: &mut HashSet<i64>,
        rng: &mut R,
    ) -> Result<Vec<SelectedItem>, CoreError> {
        let mut ranked: Vec<Ranked> = Vec::new();

        for candidate in pool.iter().filter(|c| c.item.tier == tier) {
            if picked.contains(&candidate.item.id) {
                continue;
            }
            let (successes, failures, last_used, rpu) = match stats.get(&candidate.item.id) {
                Some(s) if s.observations() > 0 => (
                    s.successes,
                    s.failures,
                    s.last_used_at,
                    s.total_value / s.observations() as f64,
                ),
                Some(s) => (s.successes, s.failures, s.last_used_at, 0.0),
                None => (0, 0, None, 0.0),
            };

            let sample = confidence::sample(successes, failures, rng)?;
            let penalty = budget::penalty(
                usage,
                self.budget.caps(),
                &candidate.item.category,
                candidate.item.urgent,
            );
            let inputs = ScoreInputs {
                sample,
                diversity: selection::diversity_bonus(candidate, recent),
                norm_value: if max_rpu > 0.0 { rpu / max_rpu } else { 0.0 },
                penalty,
                segment_multiplier: request.segment_multiplier,
                soft_flagged: candidate.soft_flagged,
            };

            if let Some(score) = selection::score(&inputs) {
                ranked.push(Ranked {
                    candidate: candidate.clone(),
                    score,
                    last_used_at: last_used,
                });
            }
        }

        let available = ranked.len();
        if available < quota && !request.allow_partial {
            return Err(CoreError::Capacity {
                recipient: request.recipient_id.clone(),
                tier,
                needed: quota,
                available,
            });
        }
        if available < quota {
            warn!(
                recipient_id = %request.recipient_id,
                tier = %tier,
                quota,
                available,
                "tier under quota, continuing with partial plan"
            );
        }

        let taken = selection::rank(ranked)
            .into_iter()
            .take(quota)
            .map(|r| {
                picked.insert(r.candidate.item.id);
                SelectedItem {
                    item_id: r.candidate.item.id,
                    tier: r.candidate.item.tier,
                    category: r.candidate.item.category,
                    urgent: r.candidate.item.urgent,
                }
            })
            .collect();
        Ok(taken)
    }

    /// COMMITTING. Hands the whole plan to the locker as one batch and
    /// records the outcome.
    pub async fn commit(&self, plan: &SchedulePlan) -> Result<ScheduleOutcome, CoreError> {
        let requests: Vec<ReservationRequest> = plan
            .slots
            .iter()
            .map(|slot| ReservationRequest {
                item_id: slot.item_id,
                recipient_id: plan.recipient_id.clone(),
                scheduled_at: slot.slot_time,
                schedule_id: plan.schedule_id.clone(),
                category: slot.category.clone(),
                tier: slot.tier.as_str().to_string(),
                urgent: slot.urgent,
            })
            .collect();

        let batch = self
            .locker
            .commit_batch(&requests, self.config.conflict_tolerance)
            .await?;

        let state = if batch.rolled_back {
            ScheduleState::Failed
        } else if batch.rejected.is_empty() {
            ScheduleState::Done
        } else {
            ScheduleState::Partial
        };

        if batch.conflict_rate() > self.config.conflict_alert_threshold {
            self.alerts.emit(AlertEvent {
                severity: Severity::Warning,
                recipient_id: plan.recipient_id.clone(),
                message: "reservation conflict rate above threshold".to_string(),
                metrics: serde_json::json!({
                    "conflict_rate": batch.conflict_rate(),
                    "rejected": batch.rejected.len(),
                    "schedule_id": plan.schedule_id,
                }),
            });
        }

        self.persist_plan(plan, state).await?;
        info!(
            recipient_id = %plan.recipient_id,
            schedule_id = %plan.schedule_id,
            state = state.as_str(),
            committed = batch.committed.len(),
            "plan committed"
        );

        Ok(ScheduleOutcome {
            plan: plan.clone(),
            state,
            rejected: batch.rejected,
        })
    }

    /// Full run: build then commit.
    pub async fn build_and_commit(
        &self,
        request: &ScheduleRequest,
        items: &[Item],
        restrictions: &[RestrictionSet],
    ) -> Result<ScheduleOutcome, CoreError> {
        let plan = self.build_plan(request, items, restrictions).await?;
        self.commit(&plan).await
    }

    async fn persist_plan(&self, plan: &SchedulePlan, state: ScheduleState) -> Result<(), CoreError> {
        let plan_json = serde_json::to_string(&plan.slots)
            .map_err(|e| CoreError::Validation(format!("plan serialization: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO schedule_plans (schedule_id, recipient_id, zone, state, plan_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&plan.schedule_id)
        .bind(&plan.recipient_id)
        .bind(plan.zone.as_str())
        .bind(state.as_str())
        .bind(plan_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Emit zone alerts after a snapshot refresh. Used by the background
    /// refresher and the snapshot CLI path.
    pub fn alert_on_snapshot(&self, snapshot: &crate::saturation::SaturationSnapshot) {
        if snapshot.zone == Zone::Red {
            self.alerts.emit(AlertEvent {
                severity: Severity::Critical,
                recipient_id: snapshot.recipient_id.clone(),
                message: "recipient in red fatigue zone".to_string(),
                metrics: serde_json::json!({
                    "exhaustion_score": snapshot.exhaustion_score,
                    "decline_days": snapshot.consecutive_decline_days,
                }),
            });
        } else if snapshot.predicted_saturation {
            self.alerts.emit(AlertEvent {
                severity: Severity::Warning,
                recipient_id: snapshot.recipient_id.clone(),
                message: "saturation predicted from leading indicators".to_string(),
                metrics: serde_json::json!({
                    "conversion_z": snapshot.conversion_deviation,
                    "volume_z": snapshot.volume_deviation,
                    "decline_days": snapshot.consecutive_decline_days,
                }),
            });
        }
    }
}
