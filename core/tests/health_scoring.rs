//! Health-score pillar tests: every band, target, and weight pinned to
//! hand-computed values so a formula change cannot slip through.

use chrono::NaiveDate;
use cxhealth_core::account::{Account, PlanType};
use cxhealth_core::aggregate::ActivityAggregate;
use cxhealth_core::features::DerivedFeatures;
use cxhealth_core::health::{score_user, HealthTier};
use cxhealth_core::population::PopulationStats;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Account whose every business-value and sentiment input scores zero.
fn cold_account() -> Account {
    Account {
        user_id: "u-cold".to_string(),
        signup_date: date(2023, 1, 15),
        plan_type: PlanType::Unknown,
        portfolio_size: 0,
        annual_revenue: 0.0,
        is_active: true,
        nps_score: -100.0,
        support_tickets_last_90d: 21,
        success_manager_assigned: false,
        csm_id: None,
        renewal_due_date: date(2030, 1, 1),
    }
}

fn cold_aggregate() -> ActivityAggregate {
    ActivityAggregate::zero("u-cold")
}

fn far_renewal() -> DerivedFeatures {
    DerivedFeatures {
        account_age_days: 400,
        days_to_renewal: 365,
        engagement_declining: false,
        activity_trend: 0.0,
    }
}

fn stats() -> PopulationStats {
    PopulationStats {
        max_annual_revenue: 100_000.0,
        max_days_since_last_activity: 200,
        max_events_per_day: 10.0,
        max_unique_features: 8,
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

// ── Usage pillar ─────────────────────────────────────────────────────────────

/// Login frequency is scored against a target of 20 logins per 30 days
/// and saturates there: 40 logins is no better than 20.
#[test]
fn login_score_saturates_at_target() {
    for (logins, expected) in [(0, 0.0), (5, 25.0), (10, 50.0), (20, 100.0), (40, 100.0)] {
        let mut aggregate = cold_aggregate();
        aggregate.logins_30d = logins;
        let score = score_user(&cold_account(), &aggregate, &far_renewal(), &stats());
        assert_close(score.login_score, expected);
    }
}

/// Session depth targets a 30-minute average.
#[test]
fn session_score_targets_thirty_minutes() {
    for (minutes, expected) in [(0.0, 0.0), (15.0, 50.0), (30.0, 100.0), (90.0, 100.0)] {
        let mut aggregate = cold_aggregate();
        aggregate.avg_session_30d = minutes;
        let score = score_user(&cold_account(), &aggregate, &far_renewal(), &stats());
        assert_close(score.session_score, expected);
    }
}

/// Core usage is banded over the sum of property, tenant, and lease
/// actions: 0 → 0, 1 → 25, 2-5 → 50, 6-10 → 75, 11+ → 100.
#[test]
fn core_usage_scores_in_bands() {
    for (actions, expected) in [
        (0, 0.0),
        (1, 25.0),
        (2, 50.0),
        (5, 50.0),
        (6, 75.0),
        (10, 75.0),
        (11, 100.0),
    ] {
        let mut aggregate = cold_aggregate();
        aggregate.property_added_count = actions;
        let score = score_user(&cold_account(), &aggregate, &far_renewal(), &stats());
        assert_close(score.core_usage_score, expected);
    }

    // Mixed kinds land in the band of their sum.
    let mut aggregate = cold_aggregate();
    aggregate.property_added_count = 2;
    aggregate.tenant_added_count = 2;
    aggregate.lease_signed_count = 2;
    let score = score_user(&cold_account(), &aggregate, &far_renewal(), &stats());
    assert_close(score.core_usage_score, 75.0);
}

/// Feature breadth targets 5 distinct features.
#[test]
fn adoption_score_targets_five_features() {
    for (unique, expected) in [(0, 0.0), (1, 20.0), (3, 60.0), (5, 100.0), (9, 100.0)] {
        let mut aggregate = cold_aggregate();
        aggregate.unique_features = unique;
        let score = score_user(&cold_account(), &aggregate, &far_renewal(), &stats());
        assert_close(score.adoption_score, expected);
    }
}

/// Recency bands are inclusive at their upper edge; the no-activity
/// sentinel (999 days) lands in the floor band.
#[test]
fn recency_bands_are_inclusive_at_edges() {
    for (days, expected) in [
        (0, 100.0),
        (7, 100.0),
        (8, 80.0),
        (14, 80.0),
        (15, 60.0),
        (30, 60.0),
        (31, 40.0),
        (60, 40.0),
        (61, 20.0),
        (90, 20.0),
        (91, 0.0),
        (999, 0.0),
    ] {
        let mut aggregate = cold_aggregate();
        aggregate.days_since_last_activity = days;
        let score = score_user(&cold_account(), &aggregate, &far_renewal(), &stats());
        assert_close(score.recency_score, expected);
    }
}

/// Usage blends its five sub-scores at 15/10/30/25/20 percent.
#[test]
fn usage_component_blends_sub_scores() {
    let mut aggregate = cold_aggregate();
    aggregate.logins_30d = 20; // 100
    aggregate.avg_session_30d = 30.0; // 100
    aggregate.property_added_count = 1; // 25
    aggregate.unique_features = 5; // 100, recency stays at 0
    let score = score_user(&cold_account(), &aggregate, &far_renewal(), &stats());
    assert_close(score.usage_component, 15.0 + 10.0 + 7.5 + 25.0);
}

// ── Business-value pillar ────────────────────────────────────────────────────

/// ARR is scored relative to the largest account in the run.
#[test]
fn arr_score_is_population_relative() {
    let mut account = cold_account();
    account.annual_revenue = 25_000.0;
    let score = score_user(&account, &cold_aggregate(), &far_renewal(), &stats());
    assert_close(score.arr_score, 25.0);
    assert_close(score.business_value_component, 10.0);

    // A population with no revenue signal scores the atom at zero.
    let empty = PopulationStats {
        max_annual_revenue: 0.0,
        ..stats()
    };
    let score = score_user(&account, &cold_aggregate(), &far_renewal(), &empty);
    assert_close(score.arr_score, 0.0);
}

/// Plan tiers map to a fixed ladder: premium 100, pro 65, starter 35.
#[test]
fn plan_score_follows_the_ladder() {
    for (plan, expected) in [
        (PlanType::Premium, 100.0),
        (PlanType::Pro, 65.0),
        (PlanType::Starter, 35.0),
        (PlanType::Unknown, 0.0),
    ] {
        let mut account = cold_account();
        account.plan_type = plan;
        let score = score_user(&account, &cold_aggregate(), &far_renewal(), &stats());
        assert_close(score.plan_score, expected);
    }
}

/// Portfolio size targets 20 units.
#[test]
fn portfolio_score_targets_twenty_units() {
    let mut account = cold_account();
    account.portfolio_size = 10;
    let score = score_user(&account, &cold_aggregate(), &far_renewal(), &stats());
    assert_close(score.portfolio_score, 50.0);

    account.portfolio_size = 50;
    let score = score_user(&account, &cold_aggregate(), &far_renewal(), &stats());
    assert_close(score.portfolio_score, 100.0);
}

// ── Sentiment pillar ─────────────────────────────────────────────────────────

/// NPS shifts from [-100, 100] onto [0, 100]: a 0 NPS is a 50.
#[test]
fn nps_normalizes_to_midpoint_fifty() {
    for (nps, expected) in [(-100.0, 0.0), (0.0, 50.0), (50.0, 75.0), (100.0, 100.0)] {
        let mut account = cold_account();
        account.nps_score = nps;
        let score = score_user(&account, &cold_aggregate(), &far_renewal(), &stats());
        assert_close(score.nps_normalized, expected);
    }
}

/// Support load is banded: 0 tickets → 100, then 80/60/40/20 down to 0
/// past 20 tickets in 90 days.
#[test]
fn support_bands_step_down_with_ticket_load() {
    for (tickets, expected) in [
        (0, 100.0),
        (1, 80.0),
        (2, 80.0),
        (3, 60.0),
        (5, 60.0),
        (6, 40.0),
        (10, 40.0),
        (11, 20.0),
        (20, 20.0),
        (21, 0.0),
    ] {
        let mut account = cold_account();
        account.support_tickets_last_90d = tickets;
        let score = score_user(&account, &cold_aggregate(), &far_renewal(), &stats());
        assert_close(score.support_health, expected);
    }
}

// ── Engagement pillar ────────────────────────────────────────────────────────

/// Engagement blends trainings (target 3), reports (target 10), and
/// 30-day consistency at 30/30/40 percent.
#[test]
fn engagement_component_blends_sub_scores() {
    let mut aggregate = cold_aggregate();
    aggregate.trainings_attended = 3; // 100
    aggregate.report_generated_count = 10; // 100
    aggregate.active_days_30d = 15; // 50
    let score = score_user(&cold_account(), &aggregate, &far_renewal(), &stats());
    assert_close(score.engagement_component, 30.0 + 30.0 + 20.0);
}

/// Consistency caps at 100 even when a 31st distinct day sneaks into a
/// 30-day window.
#[test]
fn consistency_clamps_at_full_month() {
    let mut aggregate = cold_aggregate();
    aggregate.active_days_30d = 31;
    let score = score_user(&cold_account(), &aggregate, &far_renewal(), &stats());
    assert_close(score.engagement_component, 40.0);
}

// ── Overall ──────────────────────────────────────────────────────────────────

/// Component weights sum to 1 and components cap at 100, so a maxed-out
/// user scores exactly 100 overall.
#[test]
fn perfect_user_scores_one_hundred() {
    let mut account = cold_account();
    account.plan_type = PlanType::Premium;
    account.portfolio_size = 20;
    account.annual_revenue = 100_000.0;
    account.nps_score = 100.0;
    account.support_tickets_last_90d = 0;

    let mut aggregate = cold_aggregate();
    aggregate.logins_30d = 20;
    aggregate.avg_session_30d = 30.0;
    aggregate.property_added_count = 11;
    aggregate.unique_features = 5;
    aggregate.days_since_last_activity = 0;
    aggregate.trainings_attended = 3;
    aggregate.report_generated_count = 10;
    aggregate.active_days_30d = 30;

    let score = score_user(&account, &aggregate, &far_renewal(), &stats());
    assert_close(score.usage_component, 100.0);
    assert_close(score.business_value_component, 100.0);
    assert_close(score.sentiment_component, 100.0);
    assert_close(score.engagement_component, 100.0);
    assert_close(score.overall, 100.0);
    assert_eq!(score.tier, HealthTier::Green);
}

/// A user with nothing going for them bottoms out at exactly 0.
#[test]
fn fully_cold_user_scores_zero() {
    let score = score_user(&cold_account(), &cold_aggregate(), &far_renewal(), &stats());
    assert_close(score.usage_component, 0.0);
    assert_close(score.overall, 0.0);
    assert_eq!(score.tier, HealthTier::Red);
}

/// Tier cut points: below 60 is red, 60-79.99 yellow, 80 and up green.
#[test]
fn tier_cut_points_are_inclusive_above() {
    assert_eq!(HealthTier::from_score(0.0), HealthTier::Red);
    assert_eq!(HealthTier::from_score(59.999), HealthTier::Red);
    assert_eq!(HealthTier::from_score(60.0), HealthTier::Yellow);
    assert_eq!(HealthTier::from_score(79.999), HealthTier::Yellow);
    assert_eq!(HealthTier::from_score(80.0), HealthTier::Green);
    assert_eq!(HealthTier::from_score(100.0), HealthTier::Green);
}

/// Renewal risk needs both: a renewal due inside 90 days and a red
/// overall score. 91 days out, or a healthy score, clears the flag.
#[test]
fn renewal_risk_needs_window_and_red_score() {
    let mut soon = far_renewal();
    soon.days_to_renewal = 90;
    let flagged = score_user(&cold_account(), &cold_aggregate(), &soon, &stats());
    assert!(flagged.overall < 60.0);
    assert!(flagged.at_renewal_risk);

    let mut overdue = far_renewal();
    overdue.days_to_renewal = -5;
    let still_flagged = score_user(&cold_account(), &cold_aggregate(), &overdue, &stats());
    assert!(still_flagged.at_renewal_risk);

    let mut late = far_renewal();
    late.days_to_renewal = 91;
    let unflagged = score_user(&cold_account(), &cold_aggregate(), &late, &stats());
    assert!(!unflagged.at_renewal_risk);

    // Healthy user inside the window is not at risk.
    let mut account = cold_account();
    account.plan_type = PlanType::Premium;
    account.nps_score = 100.0;
    account.support_tickets_last_90d = 0;
    let mut aggregate = cold_aggregate();
    aggregate.logins_30d = 20;
    aggregate.avg_session_30d = 30.0;
    aggregate.property_added_count = 11;
    aggregate.unique_features = 5;
    aggregate.days_since_last_activity = 0;
    aggregate.trainings_attended = 3;
    aggregate.report_generated_count = 10;
    aggregate.active_days_30d = 30;
    let mut near = far_renewal();
    near.days_to_renewal = 30;
    let healthy = score_user(&account, &aggregate, &near, &stats());
    assert!(healthy.overall >= 60.0);
    assert!(!healthy.at_renewal_risk);
}
