//! Rule-based churn model tests: each deficit factor pinned to
//! hand-computed values, plus blend weights and tier cut points.

use chrono::NaiveDate;
use cxhealth_core::account::{Account, PlanType};
use cxhealth_core::aggregate::ActivityAggregate;
use cxhealth_core::features::DerivedFeatures;
use cxhealth_core::health::{score_user, HealthScore};
use cxhealth_core::population::PopulationStats;
use cxhealth_core::risk::{ChurnRiskModel, RiskTier, UserSnapshot};
use cxhealth_core::rule_model::{RuleBasedRiskModel, HIGH_RISK_AT, MEDIUM_RISK_AT};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Owns one user's worth of pipeline state so a `UserSnapshot` can
/// borrow it. Starts fully cold; tests overwrite the fields they pin.
struct Fixture {
    account: Account,
    aggregate: ActivityAggregate,
    derived: DerivedFeatures,
    health: HealthScore,
}

impl Fixture {
    fn new() -> Self {
        let account = Account {
            user_id: "u-fix".to_string(),
            signup_date: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
            plan_type: PlanType::Starter,
            portfolio_size: 3,
            annual_revenue: 12_000.0,
            is_active: true,
            nps_score: 0.0,
            support_tickets_last_90d: 0,
            success_manager_assigned: false,
            csm_id: None,
            renewal_due_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
        };
        let aggregate = ActivityAggregate::zero("u-fix");
        let derived = DerivedFeatures {
            account_age_days: 100,
            days_to_renewal: 200,
            engagement_declining: false,
            activity_trend: 0.0,
        };
        let health = score_user(&account, &aggregate, &derived, &stats());
        Self {
            account,
            aggregate,
            derived,
            health,
        }
    }

    fn snapshot(&self) -> UserSnapshot<'_> {
        UserSnapshot {
            account: &self.account,
            aggregate: &self.aggregate,
            derived: &self.derived,
            health: &self.health,
        }
    }
}

fn stats() -> PopulationStats {
    PopulationStats {
        max_annual_revenue: 50_000.0,
        max_days_since_last_activity: 100,
        max_events_per_day: 4.0,
        max_unique_features: 8,
    }
}

fn model() -> RuleBasedRiskModel {
    RuleBasedRiskModel::new(stats())
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// A user at every population-maximum deficit saturates: 0.30 + 0.25 +
/// 0.20 + 0.15 + 0.10 = 1.0, high tier.
#[test]
fn fully_cold_user_saturates_at_one() {
    let mut fixture = Fixture::new();
    fixture.aggregate.days_since_last_activity = 100;
    fixture.aggregate.total_events = 0;
    fixture.aggregate.unique_features = 0;
    fixture.derived.activity_trend = -1.0;
    fixture.derived.days_to_renewal = 0;

    let risk = model().score(&fixture.snapshot());
    assert_close(risk.probability, 1.0);
    assert_eq!(risk.tier, RiskTier::High);
}

/// A user at every population maximum has no deficit at all.
#[test]
fn fully_engaged_user_scores_zero() {
    let mut fixture = Fixture::new();
    fixture.aggregate.days_since_last_activity = 0;
    fixture.aggregate.total_events = 400; // 4 per day over 100 days, the max
    fixture.aggregate.unique_features = 8;

    let risk = model().score(&fixture.snapshot());
    assert_close(risk.probability, 0.0);
    assert_eq!(risk.tier, RiskTier::Low);
}

/// Mid-range deficits blend to 0.45: 0.5·0.30 + 0.5·0.25 + 0.5·0.20 +
/// 0 + 0.75·0.10.
#[test]
fn factor_blend_matches_hand_computation() {
    let mut fixture = Fixture::new();
    fixture.aggregate.days_since_last_activity = 50; // 50/100
    fixture.aggregate.total_events = 100;
    fixture.derived.account_age_days = 50; // 100 events / 50 days = 2 per day, max 4
    fixture.aggregate.unique_features = 2; // 2/8: deficit 0.75
    fixture.derived.activity_trend = -0.5;
    fixture.derived.days_to_renewal = 45; // outside the 30-day window

    let rule = model();
    let factors = rule.factors(&fixture.snapshot());
    assert_close(factors.low_engagement, 0.5);
    assert_close(factors.low_usage, 0.5);
    assert_close(factors.declining_activity, 0.1);
    assert_close(factors.near_renewal, 0.0);
    assert_close(factors.low_feature_adoption, 0.75);

    let risk = rule.score(&fixture.snapshot());
    assert_close(risk.probability, 0.15 + 0.125 + 0.1 + 0.075);
    assert_eq!(risk.tier, RiskTier::Medium);
}

/// When a population maximum is zero the matching factor contributes
/// zero instead of dividing by it.
#[test]
fn absent_population_signal_contributes_zero() {
    let empty = RuleBasedRiskModel::new(PopulationStats {
        max_annual_revenue: 0.0,
        max_days_since_last_activity: 0,
        max_events_per_day: 0.0,
        max_unique_features: 0,
    });
    let mut fixture = Fixture::new();
    fixture.aggregate.days_since_last_activity = 999;
    fixture.aggregate.total_events = 0;
    fixture.aggregate.unique_features = 0;

    let factors = empty.factors(&fixture.snapshot());
    assert_close(factors.low_engagement, 0.0);
    assert_close(factors.low_usage, 0.0);
    assert_close(factors.low_feature_adoption, 0.0);
    assert_close(empty.score(&fixture.snapshot()).probability, 0.0);
}

/// Renewal pressure ramps linearly inside 30 days and keeps growing
/// past due: 30 → 0, 15 → 0.075, 0 → 0.15, 30 days overdue → 0.30.
#[test]
fn near_renewal_ramps_and_overshoots_when_overdue() {
    for (days_to_renewal, expected) in [
        (30, 0.0),
        (29, 0.005),
        (15, 0.075),
        (0, 0.15),
        (-30, 0.30),
    ] {
        let mut fixture = Fixture::new();
        fixture.derived.days_to_renewal = days_to_renewal;
        let factors = model().factors(&fixture.snapshot());
        assert_close(factors.near_renewal, expected);
    }
}

/// Only a negative trend registers as decline; flat activity is clean.
#[test]
fn decline_factor_reads_negative_trend_only() {
    for (trend, expected) in [(0.0, 0.0), (-0.25, 0.05), (-1.0, 0.2)] {
        let mut fixture = Fixture::new();
        fixture.derived.activity_trend = trend;
        let factors = model().factors(&fixture.snapshot());
        assert_close(factors.declining_activity, expected);
    }
}

/// An overdue renewal can push the raw blend past 1; the probability
/// clamps there.
#[test]
fn probability_clamps_at_one_when_overdue() {
    let mut fixture = Fixture::new();
    fixture.aggregate.days_since_last_activity = 100;
    fixture.aggregate.total_events = 0;
    fixture.aggregate.unique_features = 0;
    fixture.derived.activity_trend = -1.0;
    fixture.derived.days_to_renewal = -30; // raw blend 1.15

    let risk = model().score(&fixture.snapshot());
    assert_close(risk.probability, 1.0);
}

/// Tier cut points: [0, 0.3) low, [0.3, 0.6) medium, 0.6 and up high.
#[test]
fn tier_cut_points_are_inclusive_above() {
    assert_eq!(
        RiskTier::from_probability(0.2999, MEDIUM_RISK_AT, HIGH_RISK_AT),
        RiskTier::Low
    );
    assert_eq!(
        RiskTier::from_probability(0.30, MEDIUM_RISK_AT, HIGH_RISK_AT),
        RiskTier::Medium
    );
    assert_eq!(
        RiskTier::from_probability(0.5999, MEDIUM_RISK_AT, HIGH_RISK_AT),
        RiskTier::Medium
    );
    assert_eq!(
        RiskTier::from_probability(0.60, MEDIUM_RISK_AT, HIGH_RISK_AT),
        RiskTier::High
    );
}

#[test]
fn model_reports_its_name() {
    assert_eq!(model().name(), "rule_based");
}
