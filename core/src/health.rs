//! Health scoring — weighted roll-up of usage, business value,
//! sentiment and engagement into one 0-100 score and a traffic-light
//! tier.
//!
//! Weights and targets are fixed product decisions, not tunables; they
//! live here as constants so the whole formula reads in one place.
//! Sub-scores and components are clamped into [0, 100] before they are
//! stored; the overall score is a plain weighted sum of the clamped
//! components.

use crate::account::{Account, PlanType};
use crate::aggregate::ActivityAggregate;
use crate::features::DerivedFeatures;
use crate::population::PopulationStats;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Component weights ────────────────────────────────────────────────────────

pub const USAGE_WEIGHT: f64 = 0.40;
pub const BUSINESS_VALUE_WEIGHT: f64 = 0.30;
pub const SENTIMENT_WEIGHT: f64 = 0.20;
pub const ENGAGEMENT_WEIGHT: f64 = 0.10;

const LOGIN_WEIGHT: f64 = 0.15;
const SESSION_WEIGHT: f64 = 0.10;
const CORE_USAGE_WEIGHT: f64 = 0.30;
const ADOPTION_WEIGHT: f64 = 0.25;
const RECENCY_WEIGHT: f64 = 0.20;

const ARR_WEIGHT: f64 = 0.40;
const PORTFOLIO_WEIGHT: f64 = 0.30;
const PLAN_WEIGHT: f64 = 0.30;

const NPS_WEIGHT: f64 = 0.60;
const SUPPORT_WEIGHT: f64 = 0.40;

const TRAINING_WEIGHT: f64 = 0.30;
const REPORTING_WEIGHT: f64 = 0.30;
const CONSISTENCY_WEIGHT: f64 = 0.40;

// ── Targets mapping raw counts onto the 0-100 scale ──────────────────────────

const LOGIN_TARGET_30D: f64 = 20.0;
const SESSION_TARGET_MINUTES: f64 = 30.0;
const ADOPTION_TARGET_FEATURES: f64 = 5.0;
const PORTFOLIO_TARGET_UNITS: f64 = 20.0;
const TRAINING_TARGET: f64 = 3.0;
const REPORTING_TARGET: f64 = 10.0;

/// Accounts due within this many days are renewal-risk candidates.
pub const RENEWAL_WINDOW_DAYS: i64 = 90;

/// Tier cut points: [0, 60) Red, [60, 80) Yellow, [80, 100] Green.
pub const RED_BELOW: f64 = 60.0;
pub const YELLOW_BELOW: f64 = 80.0;

// ── Records ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTier {
    Red,
    Yellow,
    Green,
}

impl HealthTier {
    pub fn from_score(overall: f64) -> Self {
        if overall < RED_BELOW {
            Self::Red
        } else if overall < YELLOW_BELOW {
            Self::Yellow
        } else {
            Self::Green
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "red" => Some(Self::Red),
            "yellow" => Some(Self::Yellow),
            "green" => Some(Self::Green),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
        }
    }
}

impl fmt::Display for HealthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Full scoring breakdown for one user. Atomic sub-scores are kept
/// alongside the four components for score explanations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthScore {
    // Usage
    pub login_score: f64,
    pub session_score: f64,
    pub core_usage_score: f64,
    pub adoption_score: f64,
    pub recency_score: f64,
    pub usage_component: f64,
    // Business value
    pub arr_score: f64,
    pub portfolio_score: f64,
    pub plan_score: f64,
    pub business_value_component: f64,
    // Sentiment
    pub nps_normalized: f64,
    pub support_health: f64,
    pub sentiment_component: f64,
    // Engagement
    pub training_score: f64,
    pub reporting_score: f64,
    pub consistency_score: f64,
    pub engagement_component: f64,
    // Roll-up
    pub overall: f64,
    pub tier: HealthTier,
    pub at_renewal_risk: bool,
}

// ── Scoring ──────────────────────────────────────────────────────────────────

pub fn score_user(
    account: &Account,
    aggregate: &ActivityAggregate,
    derived: &DerivedFeatures,
    stats: &PopulationStats,
) -> HealthScore {
    // Usage: how much of the product the user actually touches.
    let login_score = capped_ratio(aggregate.logins_30d as f64, LOGIN_TARGET_30D);
    let session_score = capped_ratio(aggregate.avg_session_30d, SESSION_TARGET_MINUTES);
    let core_actions =
        aggregate.property_added_count + aggregate.tenant_added_count + aggregate.lease_signed_count;
    let core_usage_score = core_usage_band(core_actions);
    let adoption_score = capped_ratio(aggregate.unique_features as f64, ADOPTION_TARGET_FEATURES);
    let recency_score = recency_band(aggregate.days_since_last_activity);
    let usage_component = clamp100(
        LOGIN_WEIGHT * login_score
            + SESSION_WEIGHT * session_score
            + CORE_USAGE_WEIGHT * core_usage_score
            + ADOPTION_WEIGHT * adoption_score
            + RECENCY_WEIGHT * recency_score,
    );

    // Business value: revenue relative to the book, portfolio scale, plan.
    let arr_score = if stats.max_annual_revenue > 0.0 {
        clamp100(account.annual_revenue / stats.max_annual_revenue * 100.0)
    } else {
        0.0
    };
    let portfolio_score = capped_ratio(account.portfolio_size as f64, PORTFOLIO_TARGET_UNITS);
    let plan_score = plan_value(account.plan_type);
    let business_value_component = clamp100(
        ARR_WEIGHT * arr_score + PORTFOLIO_WEIGHT * portfolio_score + PLAN_WEIGHT * plan_score,
    );

    // Sentiment: stated (NPS) blended with revealed (ticket pressure).
    let nps_normalized = clamp100((account.nps_score + 100.0) / 2.0);
    let support_health = support_band(account.support_tickets_last_90d);
    let sentiment_component = clamp100(NPS_WEIGHT * nps_normalized + SUPPORT_WEIGHT * support_health);

    // Engagement: enablement uptake and habit strength.
    let training_score = capped_ratio(aggregate.trainings_attended as f64, TRAINING_TARGET);
    let reporting_score = capped_ratio(aggregate.report_generated_count as f64, REPORTING_TARGET);
    let consistency_score = clamp100(aggregate.active_days_30d as f64 / 30.0 * 100.0);
    let engagement_component = clamp100(
        TRAINING_WEIGHT * training_score
            + REPORTING_WEIGHT * reporting_score
            + CONSISTENCY_WEIGHT * consistency_score,
    );

    let overall = USAGE_WEIGHT * usage_component
        + BUSINESS_VALUE_WEIGHT * business_value_component
        + SENTIMENT_WEIGHT * sentiment_component
        + ENGAGEMENT_WEIGHT * engagement_component;
    let tier = HealthTier::from_score(overall);
    let at_renewal_risk = derived.days_to_renewal <= RENEWAL_WINDOW_DAYS && overall < RED_BELOW;

    HealthScore {
        login_score,
        session_score,
        core_usage_score,
        adoption_score,
        recency_score,
        usage_component,
        arr_score,
        portfolio_score,
        plan_score,
        business_value_component,
        nps_normalized,
        support_health,
        sentiment_component,
        training_score,
        reporting_score,
        consistency_score,
        engagement_component,
        overall,
        tier,
        at_renewal_risk,
    }
}

// ── Formula pieces ───────────────────────────────────────────────────────────

fn capped_ratio(value: f64, target: f64) -> f64 {
    (value / target * 100.0).clamp(0.0, 100.0)
}

fn clamp100(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Banded score over property + tenant + lease action counts.
fn core_usage_band(actions: i64) -> f64 {
    if actions <= 0 {
        0.0
    } else if actions == 1 {
        25.0
    } else if actions <= 5 {
        50.0
    } else if actions <= 10 {
        75.0
    } else {
        100.0
    }
}

/// Banded score over days since last activity. The inactivity sentinel
/// falls through every band to 0.
fn recency_band(days: i64) -> f64 {
    if days <= 7 {
        100.0
    } else if days <= 14 {
        80.0
    } else if days <= 30 {
        60.0
    } else if days <= 60 {
        40.0
    } else if days <= 90 {
        20.0
    } else {
        0.0
    }
}

/// Banded score over support tickets filed in the last 90 days.
fn support_band(tickets: i64) -> f64 {
    if tickets <= 0 {
        100.0
    } else if tickets <= 2 {
        80.0
    } else if tickets <= 5 {
        60.0
    } else if tickets <= 10 {
        40.0
    } else if tickets <= 20 {
        20.0
    } else {
        0.0
    }
}

fn plan_value(plan: PlanType) -> f64 {
    match plan {
        PlanType::Premium => 100.0,
        PlanType::Pro => 65.0,
        PlanType::Starter => 35.0,
        PlanType::Unknown => 0.0,
    }
}
