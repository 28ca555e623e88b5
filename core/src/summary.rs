//! Run-level KPI roll-up over the finished master table.

use crate::health::HealthTier;
use crate::master::MasterRecord;
use crate::risk::RiskTier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub red: usize,
    pub yellow: usize,
    pub green: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_users: usize,
    pub active_users: usize,
    pub inactive_users: usize,
    pub total_arr: f64,
    pub avg_arr: f64,
    pub avg_nps: f64,
    pub avg_health_score: f64,
    pub health_tiers: TierCounts,
    pub plan_counts: BTreeMap<String, usize>,
    /// Users the ML model places in the high churn tier.
    pub high_risk_users: usize,
    pub renewal_risk_users: usize,
    pub gross_revenue_retention: f64,
    /// No expansion or contraction amounts are tracked, so net and
    /// gross retention coincide.
    pub net_revenue_retention: f64,
}

impl RunSummary {
    pub fn from_master(rows: &[MasterRecord]) -> Self {
        let total_users = rows.len();
        let active_users = rows.iter().filter(|row| row.is_active).count();

        let total_arr: f64 = rows.iter().map(|row| row.annual_revenue).sum();
        let avg_arr = average(total_arr, total_users);
        let avg_nps = average(rows.iter().map(|row| row.nps_score).sum(), total_users);
        let avg_health_score = average(rows.iter().map(|row| row.health_score).sum(), total_users);

        let mut health_tiers = TierCounts::default();
        for row in rows {
            match row.health_tier {
                HealthTier::Red => health_tiers.red += 1,
                HealthTier::Yellow => health_tiers.yellow += 1,
                HealthTier::Green => health_tiers.green += 1,
            }
        }

        let mut plan_counts: BTreeMap<String, usize> = BTreeMap::new();
        for row in rows {
            *plan_counts.entry(row.plan_type.as_tag().to_string()).or_insert(0) += 1;
        }

        let retention = revenue_retention(rows);

        Self {
            total_users,
            active_users,
            inactive_users: total_users - active_users,
            total_arr,
            avg_arr,
            avg_nps,
            avg_health_score,
            health_tiers,
            plan_counts,
            high_risk_users: rows
                .iter()
                .filter(|row| row.ml_churn_tier == RiskTier::High)
                .count(),
            renewal_risk_users: rows.iter().filter(|row| row.at_renewal_risk).count(),
            gross_revenue_retention: retention,
            net_revenue_retention: retention,
        }
    }
}

/// Percent of total ARR held by still-active accounts. Zero when the
/// book carries no revenue at all.
pub fn revenue_retention(rows: &[MasterRecord]) -> f64 {
    let total: f64 = rows.iter().map(|row| row.annual_revenue).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let retained: f64 = rows
        .iter()
        .filter(|row| row.is_active)
        .map(|row| row.annual_revenue)
        .sum();
    retained / total * 100.0
}

fn average(sum: f64, count: usize) -> f64 {
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}
