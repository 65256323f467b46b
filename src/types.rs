// src/types.rs

//! Shared domain types: catalog items, restriction sets, schedule requests/plans.
//! Items and restrictions are owned by external collaborators (content catalog,
//! configuration surface); they arrive here already built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered value tier for a content item. `Filler` is free engagement content
/// interleaved between paid sends; the rest are ascending price bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueTier {
    Filler,
    Low,
    Mid,
    High,
    Premium,
}

impl ValueTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filler => "filler",
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
            Self::Premium => "premium",
        }
    }

    /// Tiers counted against PPV-style volume targets (everything but filler).
    pub fn is_paid(&self) -> bool {
        !matches!(self, Self::Filler)
    }
}

impl fmt::Display for ValueTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filler" | "free" | "bump" => Ok(Self::Filler),
            "low" | "budget" => Ok(Self::Low),
            "mid" | "standard" => Ok(Self::Mid),
            "high" => Ok(Self::High),
            "premium" | "luxury" => Ok(Self::Premium),
            other => Err(format!("unknown value tier '{other}'")),
        }
    }
}

/// A reusable content item. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub text: String,
    pub category: String,
    pub tier: ValueTier,
    #[serde(default)]
    pub urgent: bool,
}

/// Scope a restriction set applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionScope {
    Global,
    Recipient(String),
    Tier(ValueTier),
    Category(String),
}

/// Read-only exclusion rules from the external configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictionSet {
    pub scope: RestrictionScope,
    /// Items whose text matches any of these (case-insensitive substring) are dropped.
    #[serde(default)]
    pub hard_patterns: Vec<String>,
    /// Matching items stay eligible but the scorer dampens them.
    #[serde(default)]
    pub soft_patterns: Vec<String>,
    #[serde(default)]
    pub excluded_categories: Vec<String>,
    #[serde(default)]
    pub excluded_tiers: Vec<ValueTier>,
    /// Minimum pool size below which the zero-signal filter is not applied.
    #[serde(default)]
    pub min_pool_floor: Option<usize>,
}

impl RestrictionSet {
    /// Whether this set applies to the given recipient/item combination.
    pub fn applies_to(&self, recipient_id: &str, item: &Item) -> bool {
        match &self.scope {
            RestrictionScope::Global => true,
            RestrictionScope::Recipient(r) => r == recipient_id,
            RestrictionScope::Tier(t) => *t == item.tier,
            RestrictionScope::Category(c) => c.eq_ignore_ascii_case(&item.category),
        }
    }
}

/// Discrete account-size bands driving weekly volume and spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountTier {
    Micro,
    Small,
    Medium,
    Large,
    Mega,
}

impl FromStr for AccountTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "micro" => Ok(Self::Micro),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            "mega" => Ok(Self::Mega),
            other => Err(format!("unknown account tier '{other}'")),
        }
    }
}

/// Behavioral segment from the external account-classification service.
/// Drives the default tier mix when a request carries no explicit quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehavioralSegment {
    Exploratory,
    Budget,
    Standard,
    Premium,
    Luxury,
}

impl FromStr for BehavioralSegment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exploratory" => Ok(Self::Exploratory),
            "budget" => Ok(Self::Budget),
            "standard" => Ok(Self::Standard),
            "premium" => Ok(Self::Premium),
            "luxury" => Ok(Self::Luxury),
            other => Err(format!("unknown behavioral segment '{other}'")),
        }
    }
}

/// Everything the scheduler needs to build one recipient's plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub recipient_id: String,
    pub period_start: DateTime<Utc>,
    pub account_tier: AccountTier,
    /// Explicit per-tier quotas. Empty means: derive from the behavioral segment.
    #[serde(default)]
    pub tier_quotas: Vec<(ValueTier, usize)>,
    pub segment: BehavioralSegment,
    /// Price-sensitivity adjustment from the segment classifier, clamped to [1.0, 1.25].
    #[serde(default = "default_segment_multiplier")]
    pub segment_multiplier: f64,
    /// Peak-hour hints (0-23) from the external analytics collaborator, if any.
    #[serde(default)]
    pub peak_hours: Vec<u32>,
    /// Whether a plan that misses some tier quotas is acceptable.
    #[serde(default)]
    pub allow_partial: bool,
}

fn default_segment_multiplier() -> f64 {
    1.0
}

/// One (item, time, tier) placement inside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSlot {
    pub item_id: i64,
    pub slot_time: DateTime<Utc>,
    pub tier: ValueTier,
    pub category: String,
    pub urgent: bool,
}

/// The ordered plan the scheduler hands to the assignment locker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePlan {
    pub schedule_id: String,
    pub recipient_id: String,
    pub zone: crate::saturation::Zone,
    pub slots: Vec<PlannedSlot>,
}
