// src/scheduler/sizing.rs

//! Volume sizing: account-size bands crossed with the fatigue zone, plus the
//! behavioral-segment tier mix used when a request carries no explicit quotas.

use crate::saturation::Zone;
use crate::types::{AccountTier, BehavioralSegment, ScheduleRequest, ValueTier};

/// Weekly volume band for an account size.
#[derive(Debug, Clone, Copy)]
pub struct Band {
    pub weekly_min: usize,
    pub weekly_max: usize,
    pub min_gap_minutes: i64,
    pub max_per_day: usize,
}

pub fn band(tier: AccountTier) -> Band {
    match tier {
        AccountTier::Micro => Band { weekly_min: 5, weekly_max: 7, min_gap_minutes: 180, max_per_day: 8 },
        AccountTier::Small => Band { weekly_min: 7, weekly_max: 10, min_gap_minutes: 150, max_per_day: 10 },
        AccountTier::Medium => Band { weekly_min: 10, weekly_max: 14, min_gap_minutes: 120, max_per_day: 15 },
        AccountTier::Large => Band { weekly_min: 14, weekly_max: 18, min_gap_minutes: 90, max_per_day: 20 },
        AccountTier::Mega => Band { weekly_min: 18, weekly_max: 25, min_gap_minutes: 75, max_per_day: 25 },
    }
}

/// Throttle applied on top of the band depending on the fatigue zone.
#[derive(Debug, Clone, Copy)]
pub struct ZoneAdjustment {
    pub volume_factor: f64,
    pub filler_factor: f64,
    pub extra_gap_minutes: i64,
    /// Leading days carrying only filler content.
    pub cooldown_days: u32,
}

pub fn zone_adjustment(zone: Zone) -> ZoneAdjustment {
    match zone.effective() {
        Zone::Green => ZoneAdjustment {
            volume_factor: 1.0,
            filler_factor: 1.0,
            extra_gap_minutes: 0,
            cooldown_days: 0,
        },
        Zone::Red => ZoneAdjustment {
            volume_factor: 0.5,
            filler_factor: 2.0,
            extra_gap_minutes: 60,
            cooldown_days: 2,
        },
        // Yellow, and Unknown folded into it.
        _ => ZoneAdjustment {
            volume_factor: 0.75,
            filler_factor: 1.2,
            extra_gap_minutes: 30,
            cooldown_days: 0,
        },
    }
}

/// Fraction of paid volume assigned to low/mid/high tiers per segment.
pub fn tier_distribution(segment: BehavioralSegment) -> (f64, f64, f64) {
    match segment {
        BehavioralSegment::Budget | BehavioralSegment::Exploratory => (0.60, 0.30, 0.10),
        BehavioralSegment::Premium | BehavioralSegment::Luxury => (0.15, 0.35, 0.50),
        BehavioralSegment::Standard => (0.30, 0.45, 0.25),
    }
}

/// Resolved sizing for one plan.
#[derive(Debug, Clone)]
pub struct Sizing {
    pub quotas: Vec<(ValueTier, usize)>,
    pub min_gap_minutes: i64,
    pub max_per_day: usize,
    pub cooldown_days: u32,
}

impl Sizing {
    pub fn total_slots(&self) -> usize {
        self.quotas.iter().map(|(_, n)| n).sum()
    }
}

fn scale(n: usize, factor: f64) -> usize {
    ((n as f64 * factor).round() as usize).max(if n > 0 { 1 } else { 0 })
}

/// Cross the account band with the zone throttle. Explicit request quotas
/// are honored (scaled under a throttled zone); otherwise the quota mix is
/// derived from the segment distribution over the band midpoint.
pub fn size(request: &ScheduleRequest, zone: Zone) -> Sizing {
    let band = band(request.account_tier);
    let adj = zone_adjustment(zone);

    let quotas = if !request.tier_quotas.is_empty() {
        request
            .tier_quotas
            .iter()
            .map(|&(tier, n)| {
                let factor = if tier == ValueTier::Filler {
                    adj.volume_factor * adj.filler_factor
                } else {
                    adj.volume_factor
                };
                (tier, scale(n, factor))
            })
            .collect()
    } else {
        let weekly = (band.weekly_min + band.weekly_max) / 2;
        let paid = scale(weekly, adj.volume_factor);
        let (low, mid, high) = tier_distribution(request.segment);

        let low_n = (paid as f64 * low).round() as usize;
        let high_n = (paid as f64 * high).round() as usize;
        let mid_n = paid.saturating_sub(low_n + high_n);
        // Roughly one filler per three paid sends, scaled by the zone.
        let filler_n = scale(paid.div_ceil(3), adj.filler_factor);

        vec![
            (ValueTier::Low, low_n),
            (ValueTier::Mid, mid_n),
            (ValueTier::High, high_n),
            (ValueTier::Filler, filler_n),
        ]
    };

    Sizing {
        quotas,
        min_gap_minutes: band.min_gap_minutes + adj.extra_gap_minutes,
        max_per_day: band.max_per_day,
        cooldown_days: adj.cooldown_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(tier: AccountTier, segment: BehavioralSegment, quotas: Vec<(ValueTier, usize)>) -> ScheduleRequest {
        ScheduleRequest {
            recipient_id: "r1".into(),
            period_start: Utc::now(),
            account_tier: tier,
            tier_quotas: quotas,
            segment,
            segment_multiplier: 1.0,
            peak_hours: vec![],
            allow_partial: false,
        }
    }

    #[test]
    fn green_keeps_explicit_quotas_verbatim() {
        let req = request(
            AccountTier::Small,
            BehavioralSegment::Standard,
            vec![(ValueTier::High, 5), (ValueTier::Mid, 3), (ValueTier::Filler, 2)],
        );
        let sizing = size(&req, Zone::Green);
        assert_eq!(sizing.total_slots(), 10);
        assert_eq!(sizing.min_gap_minutes, 150);
        assert_eq!(sizing.cooldown_days, 0);
    }

    #[test]
    fn yellow_throttles_volume_and_widens_gap() {
        let req = request(
            AccountTier::Small,
            BehavioralSegment::Standard,
            vec![(ValueTier::High, 4), (ValueTier::Filler, 2)],
        );
        let sizing = size(&req, Zone::Yellow);
        let high = sizing.quotas.iter().find(|(t, _)| *t == ValueTier::High).unwrap().1;
        let filler = sizing.quotas.iter().find(|(t, _)| *t == ValueTier::Filler).unwrap().1;
        assert_eq!(high, 3); // 4 * 0.75
        assert_eq!(filler, 2); // 2 * 0.75 * 1.2 = 1.8, rounds to 2
        assert_eq!(sizing.min_gap_minutes, 180);
    }

    #[test]
    fn red_halves_volume_doubles_filler_adds_cooldown() {
        let req = request(
            AccountTier::Medium,
            BehavioralSegment::Standard,
            vec![(ValueTier::High, 6), (ValueTier::Filler, 2)],
        );
        let sizing = size(&req, Zone::Red);
        let high = sizing.quotas.iter().find(|(t, _)| *t == ValueTier::High).unwrap().1;
        let filler = sizing.quotas.iter().find(|(t, _)| *t == ValueTier::Filler).unwrap().1;
        assert_eq!(high, 3);
        assert_eq!(filler, 2); // 2 * 0.5 * 2.0
        assert_eq!(sizing.min_gap_minutes, 180);
        assert_eq!(sizing.cooldown_days, 2);
    }

    #[test]
    fn unknown_zone_throttles_like_yellow() {
        let req = request(AccountTier::Small, BehavioralSegment::Standard, vec![(ValueTier::Mid, 4)]);
        let unknown = size(&req, Zone::Unknown);
        let yellow = size(&req, Zone::Yellow);
        assert_eq!(unknown.quotas, yellow.quotas);
        assert_eq!(unknown.min_gap_minutes, yellow.min_gap_minutes);
    }

    #[test]
    fn segment_mix_fills_missing_quotas() {
        let req = request(AccountTier::Medium, BehavioralSegment::Luxury, vec![]);
        let sizing = size(&req, Zone::Green);
        // Medium midpoint is 12 paid sends; luxury mix skews high.
        let get = |t| sizing.quotas.iter().find(|(tt, _)| *tt == t).unwrap().1;
        assert_eq!(get(ValueTier::Low) + get(ValueTier::Mid) + get(ValueTier::High), 12);
        assert!(get(ValueTier::High) > get(ValueTier::Low));
        assert!(get(ValueTier::Filler) > 0);
    }

    #[test]
    fn budget_segment_skews_low() {
        let req = request(AccountTier::Micro, BehavioralSegment::Budget, vec![]);
        let sizing = size(&req, Zone::Green);
        let get = |t| sizing.quotas.iter().find(|(tt, _)| *tt == t).unwrap().1;
        assert!(get(ValueTier::Low) > get(ValueTier::High));
    }

    #[test]
    fn nonzero_quota_never_scales_to_zero() {
        let req = request(AccountTier::Small, BehavioralSegment::Standard, vec![(ValueTier::High, 1)]);
        let sizing = size(&req, Zone::Red);
        assert_eq!(sizing.quotas[0].1, 1);
    }
}
