//! The account registry — one row per customer, current as of the
//! reference instant the pipeline is run against.

use crate::types::UserId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Subscription plan. Unrecognized labels land on `Unknown`, which
/// scores zero plan value instead of failing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Starter,
    Pro,
    Premium,
    Unknown,
}

impl PlanType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "starter" => Self::Starter,
            "pro" => Self::Pro,
            "premium" => Self::Premium,
            _ => Self::Unknown,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Premium => "premium",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub signup_date: NaiveDate,
    pub plan_type: PlanType,
    pub portfolio_size: i64,
    pub annual_revenue: f64,
    pub is_active: bool,
    /// Net promoter score in [-100, 100].
    pub nps_score: f64,
    pub support_tickets_last_90d: i64,
    pub success_manager_assigned: bool,
    pub csm_id: Option<String>,
    pub renewal_due_date: NaiveDate,
}
