// src/saturation/engagement.rs

//! Composite 0-100 engagement score per recipient. Pure functions over
//! already-aggregated metrics; callers feed it from `StatsAggregate` and the
//! usage journal.

const W_REVENUE: f64 = 0.4;
const W_CONVERSION: f64 = 0.3;
const W_EXECUTION: f64 = 0.2;
const W_DIVERSITY: f64 = 0.1;

/// Revenue per send that maps to a full component score.
const RPS_CEILING: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum EngagementTier {
    Elite,
    High,
    Standard,
    NeedsImprovement,
    Critical,
}

impl EngagementTier {
    fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            EngagementTier::Elite
        } else if score >= 60.0 {
            EngagementTier::High
        } else if score >= 40.0 {
            EngagementTier::Standard
        } else if score >= 20.0 {
            EngagementTier::NeedsImprovement
        } else {
            EngagementTier::Critical
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngagementInputs {
    /// Average revenue per message sent.
    pub revenue_per_send: f64,
    /// Purchase rate as a fraction in [0, 1].
    pub conversion_rate: f64,
    /// Fraction of planned slots actually committed, in [0, 1].
    pub execution_rate: f64,
    /// Content variety in [0, 1]; distinct items over total sends works.
    pub diversity: f64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ComponentScores {
    pub revenue_per_send: f64,
    pub conversion: f64,
    pub execution: f64,
    pub diversity: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EngagementReport {
    pub score: f64,
    pub tier: EngagementTier,
    pub components: ComponentScores,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum Priority {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Finding {
    pub priority: Priority,
    pub component: &'static str,
    pub message: &'static str,
}

pub fn score(inputs: &EngagementInputs) -> EngagementReport {
    let components = ComponentScores {
        revenue_per_send: ((inputs.revenue_per_send / RPS_CEILING) * 100.0).clamp(0.0, 100.0),
        conversion: (inputs.conversion_rate * 100.0).clamp(0.0, 100.0),
        execution: (inputs.execution_rate * 100.0).clamp(0.0, 100.0),
        diversity: (inputs.diversity * 100.0).clamp(0.0, 100.0),
    };

    let total = components.revenue_per_send * W_REVENUE
        + components.conversion * W_CONVERSION
        + components.execution * W_EXECUTION
        + components.diversity * W_DIVERSITY;

    let mut findings = Vec::new();
    if components.execution < 90.0 {
        findings.push(Finding {
            priority: Priority::Critical,
            component: "execution",
            message: "scheduled slots are not being committed; missed slots cost revenue directly",
        });
    }
    if components.revenue_per_send < 40.0 {
        findings.push(Finding {
            priority: Priority::High,
            component: "revenue_per_send",
            message: "revenue per send is below target; weight higher-value tiers and peak hours",
        });
    }
    if components.conversion < 40.0 {
        findings.push(Finding {
            priority: Priority::High,
            component: "conversion",
            message: "conversion is below target; review item quality and urgency usage",
        });
    }
    if components.diversity < 60.0 {
        findings.push(Finding {
            priority: Priority::Medium,
            component: "diversity",
            message: "low content variety risks audience fatigue; widen the candidate pool",
        });
    }
    findings.sort_by_key(|f| f.priority);

    EngagementReport {
        score: total,
        tier: EngagementTier::from_score(total),
        components,
        findings,
    }
}
