//! Churn-risk model seam.
//!
//! RULE: Every churn model scores one user at a time from the shared
//! per-user snapshot and returns a probability in [0, 1] plus a tier.
//! Models never reach back into the population; dataset-wide context
//! arrives pre-reduced in `PopulationStats`.

use crate::account::Account;
use crate::aggregate::ActivityAggregate;
use crate::features::DerivedFeatures;
use crate::health::HealthScore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read-only view of everything the pipeline knows about one user by
/// the time risk models run.
#[derive(Debug, Clone, Copy)]
pub struct UserSnapshot<'a> {
    pub account: &'a Account,
    pub aggregate: &'a ActivityAggregate,
    pub derived: &'a DerivedFeatures,
    pub health: &'a HealthScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Band a probability with model-specific cut points. Both bounds
    /// are "first tier strictly below": p < medium_at is Low, p <
    /// high_at is Medium, the rest High.
    pub fn from_probability(p: f64, medium_at: f64, high_at: f64) -> Self {
        if p < medium_at {
            Self::Low
        } else if p < high_at {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChurnRisk {
    pub probability: f64,
    pub tier: RiskTier,
}

pub trait ChurnRiskModel {
    fn name(&self) -> &'static str;
    fn score(&self, user: &UserSnapshot<'_>) -> ChurnRisk;
}
