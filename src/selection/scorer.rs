// src/selection/scorer.rs

//! Composite candidate scoring and deterministic ranking.
//!
//! The stochastic part of a score is the confidence sample; everything here
//! is a pure function of its inputs so the same draw always ranks the same.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::pool::Candidate;

const W_SAMPLE: f64 = 0.70;
const W_DIVERSITY: f64 = 0.15;
const W_VALUE: f64 = 0.15;
const W_PENALTY: f64 = 0.10;

/// Multiplier applied when a soft-exclude pattern matched the item text.
const SOFT_FLAG_DAMPEN: f64 = 0.9;

/// What the recipient has already seen inside the rolling window, reduced to
/// the three diversity dimensions.
#[derive(Debug, Clone, Default)]
pub struct RecentUsage {
    pub categories: HashSet<String>,
    pub tiers: HashSet<String>,
    pub any_urgent: bool,
}

/// Per-dimension novelty bonus. A dimension value absent from the window
/// earns +0.1; a repeat costs -0.2. Range is [-0.6, 0.3].
pub fn diversity_bonus(candidate: &Candidate, recent: &RecentUsage) -> f64 {
    let mut bonus = 0.0;

    bonus += if recent.categories.contains(&candidate.item.category) {
        -0.2
    } else {
        0.1
    };
    bonus += if recent.tiers.contains(candidate.item.tier.as_str()) {
        -0.2
    } else {
        0.1
    };
    if candidate.item.urgent {
        bonus += if recent.any_urgent { -0.2 } else { 0.1 };
    }

    bonus
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs {
    /// Confidence sample drawn from the Wilson interval.
    pub sample: f64,
    pub diversity: f64,
    /// Revenue per use, normalized against the pool maximum.
    pub norm_value: f64,
    /// Budget penalty. At or below -1.0 the candidate is excluded outright.
    pub penalty: f64,
    pub segment_multiplier: f64,
    pub soft_flagged: bool,
}

/// Composite score. `None` means the budget penalty hard-excludes the
/// candidate before ranking.
pub fn score(inputs: &ScoreInputs) -> Option<f64> {
    if inputs.penalty <= -1.0 {
        return None;
    }

    let base = inputs.sample * W_SAMPLE
        + inputs.diversity * W_DIVERSITY
        + inputs.norm_value * W_VALUE
        + inputs.penalty * W_PENALTY;

    let base = if inputs.soft_flagged {
        base * SOFT_FLAG_DAMPEN
    } else {
        base
    };

    Some(base * inputs.segment_multiplier.clamp(1.0, 1.25))
}

/// A scored candidate carrying the tie-break inputs.
#[derive(Debug, Clone)]
pub struct Ranked {
    pub candidate: Candidate,
    pub score: f64,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Sort best-first. Ties break toward the less recently used item (never
/// used beats any timestamp), then toward the lower item id.
pub fn rank(mut scored: Vec<Ranked>) -> Vec<Ranked> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| match (a.last_used_at, b.last_used_at) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(x), Some(y)) => x.cmp(&y),
            })
            .then_with(|| a.candidate.item.id.cmp(&b.candidate.item.id))
    });
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Item, ValueTier};
    use chrono::Duration;

    fn candidate(id: i64, category: &str, tier: ValueTier, urgent: bool) -> Candidate {
        Candidate {
            item: Item {
                id,
                text: "t".into(),
                category: category.into(),
                tier,
                urgent,
            },
            soft_flagged: false,
        }
    }

    fn inputs(sample: f64) -> ScoreInputs {
        ScoreInputs {
            sample,
            diversity: 0.0,
            norm_value: 0.0,
            penalty: 0.0,
            segment_multiplier: 1.0,
            soft_flagged: false,
        }
    }

    #[test]
    fn hard_penalty_excludes() {
        let mut i = inputs(0.9);
        i.penalty = -1.0;
        assert!(score(&i).is_none());
    }

    #[test]
    fn weights_compose() {
        let i = ScoreInputs {
            sample: 0.8,
            diversity: 0.2,
            norm_value: 0.5,
            penalty: -0.3,
            segment_multiplier: 1.0,
            soft_flagged: false,
        };
        let expected = 0.8 * 0.70 + 0.2 * 0.15 + 0.5 * 0.15 + (-0.3) * 0.10;
        assert!((score(&i).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn segment_multiplier_is_clamped() {
        let mut i = inputs(1.0);
        i.segment_multiplier = 0.5;
        let floor = score(&i).unwrap();
        i.segment_multiplier = 1.0;
        assert_eq!(score(&i).unwrap(), floor);

        i.segment_multiplier = 3.0;
        let ceil = score(&i).unwrap();
        i.segment_multiplier = 1.25;
        assert_eq!(score(&i).unwrap(), ceil);
    }

    #[test]
    fn soft_flag_dampens() {
        let mut i = inputs(1.0);
        let clean = score(&i).unwrap();
        i.soft_flagged = true;
        assert!((score(&i).unwrap() - clean * 0.9).abs() < 1e-12);
    }

    #[test]
    fn diversity_rewards_novelty_per_dimension() {
        let mut recent = RecentUsage::default();
        recent.categories.insert("solo".into());
        recent.tiers.insert("high".into());

        // Repeat category, repeat tier, non-urgent.
        let c = candidate(1, "solo", ValueTier::High, false);
        assert!((diversity_bonus(&c, &recent) - (-0.4)).abs() < 1e-12);

        // Fresh everything, urgent with no urgent in window.
        let c = candidate(2, "tease", ValueTier::Mid, true);
        assert!((diversity_bonus(&c, &recent) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn ties_break_by_recency_then_id() {
        let now = Utc::now();
        let ranked = rank(vec![
            Ranked {
                candidate: candidate(3, "a", ValueTier::Mid, false),
                score: 0.5,
                last_used_at: Some(now),
            },
            Ranked {
                candidate: candidate(2, "a", ValueTier::Mid, false),
                score: 0.5,
                last_used_at: Some(now - Duration::days(3)),
            },
            Ranked {
                candidate: candidate(9, "a", ValueTier::Mid, false),
                score: 0.5,
                last_used_at: None,
            },
            Ranked {
                candidate: candidate(1, "a", ValueTier::Mid, false),
                score: 0.9,
                last_used_at: Some(now),
            },
        ]);

        let ids: Vec<i64> = ranked.iter().map(|r| r.candidate.item.id).collect();
        assert_eq!(ids, vec![1, 9, 2, 3]);
    }

    #[test]
    fn same_recency_falls_back_to_id() {
        let ranked = rank(vec![
            Ranked {
                candidate: candidate(7, "a", ValueTier::Mid, false),
                score: 0.5,
                last_used_at: None,
            },
            Ranked {
                candidate: candidate(4, "a", ValueTier::Mid, false),
                score: 0.5,
                last_used_at: None,
            },
        ]);
        assert_eq!(ranked[0].candidate.item.id, 4);
    }
}
