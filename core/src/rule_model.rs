//! Rule-based churn model — the explainable fallback scorer.
//!
//! Five deficit factors, each normalized against the dataset maxima
//! from the reduce pass. Three factors are weighted in the final blend;
//! the declining-activity and near-renewal factors carry their weights
//! inside the factor formula and enter the blend at weight 1. A factor
//! whose population maximum is zero contributes zero.

use crate::features;
use crate::population::PopulationStats;
use crate::risk::{ChurnRisk, ChurnRiskModel, RiskTier, UserSnapshot};
use serde::{Deserialize, Serialize};

pub const ENGAGEMENT_FACTOR_WEIGHT: f64 = 0.30;
pub const USAGE_FACTOR_WEIGHT: f64 = 0.25;
pub const ADOPTION_FACTOR_WEIGHT: f64 = 0.10;
/// Applied inside the declining-activity factor, not in the blend.
pub const DECLINE_FACTOR_WEIGHT: f64 = 0.20;
/// Applied inside the near-renewal factor, not in the blend.
pub const RENEWAL_FACTOR_WEIGHT: f64 = 0.15;

/// Tier cut points for this model: [0, 0.3) low, [0.3, 0.6) medium.
pub const MEDIUM_RISK_AT: f64 = 0.30;
pub const HIGH_RISK_AT: f64 = 0.60;

const NEAR_RENEWAL_DAYS: i64 = 30;

/// Per-factor breakdown, kept for score explanations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskFactors {
    pub low_engagement: f64,
    pub low_usage: f64,
    /// Pre-weighted by [`DECLINE_FACTOR_WEIGHT`].
    pub declining_activity: f64,
    /// Pre-weighted by [`RENEWAL_FACTOR_WEIGHT`]. Exceeds the weight
    /// once the renewal date is overdue; the final clamp bounds it.
    pub near_renewal: f64,
    pub low_feature_adoption: f64,
}

pub struct RuleBasedRiskModel {
    stats: PopulationStats,
}

impl RuleBasedRiskModel {
    pub fn new(stats: PopulationStats) -> Self {
        Self { stats }
    }

    pub fn factors(&self, user: &UserSnapshot<'_>) -> RiskFactors {
        let stats = &self.stats;

        let low_engagement = if stats.max_days_since_last_activity > 0 {
            user.aggregate.days_since_last_activity as f64
                / stats.max_days_since_last_activity as f64
        } else {
            0.0
        };

        let low_usage = if stats.max_events_per_day > 0.0 {
            let epd = features::events_per_day(
                user.aggregate.total_events,
                user.derived.account_age_days,
            );
            1.0 - epd / stats.max_events_per_day
        } else {
            0.0
        };

        let declining_activity = if user.derived.activity_trend < 0.0 {
            user.derived.activity_trend.abs() * DECLINE_FACTOR_WEIGHT
        } else {
            0.0
        };

        let near_renewal = if user.derived.days_to_renewal < NEAR_RENEWAL_DAYS {
            (NEAR_RENEWAL_DAYS - user.derived.days_to_renewal) as f64 / NEAR_RENEWAL_DAYS as f64
                * RENEWAL_FACTOR_WEIGHT
        } else {
            0.0
        };

        let low_feature_adoption = if stats.max_unique_features > 0 {
            1.0 - user.aggregate.unique_features as f64 / stats.max_unique_features as f64
        } else {
            0.0
        };

        RiskFactors {
            low_engagement,
            low_usage,
            declining_activity,
            near_renewal,
            low_feature_adoption,
        }
    }
}

impl ChurnRiskModel for RuleBasedRiskModel {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    fn score(&self, user: &UserSnapshot<'_>) -> ChurnRisk {
        let f = self.factors(user);
        let raw = ENGAGEMENT_FACTOR_WEIGHT * f.low_engagement
            + USAGE_FACTOR_WEIGHT * f.low_usage
            + f.declining_activity
            + f.near_renewal
            + ADOPTION_FACTOR_WEIGHT * f.low_feature_adoption;
        let probability = raw.clamp(0.0, 1.0);

        ChurnRisk {
            probability,
            tier: RiskTier::from_probability(probability, MEDIUM_RISK_AT, HIGH_RISK_AT),
        }
    }
}
