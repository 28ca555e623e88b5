//! Master table assembly — the single-table join of every stage.
//!
//! RULE: Exactly one row per account. A duplicate user_id aborts the
//! run; an account absent from the event log joins against the
//! all-zero aggregate instead of being dropped. Missing rows from any
//! later stage mean the caller wired the maps wrong and fail the join.

use crate::account::{Account, PlanType};
use crate::aggregate::ActivityAggregate;
use crate::error::{PipelineError, PipelineResult};
use crate::features::DerivedFeatures;
use crate::health::{HealthScore, HealthTier};
use crate::risk::{ChurnRisk, RiskTier};
use crate::types::UserId;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One fully joined row of the master table. Field order is the
/// persisted column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterRecord {
    // Account registry
    pub user_id: UserId,
    pub signup_date: NaiveDate,
    pub plan_type: PlanType,
    pub portfolio_size: i64,
    pub annual_revenue: f64,
    pub is_active: bool,
    pub nps_score: f64,
    pub support_tickets_last_90d: i64,
    pub success_manager_assigned: bool,
    pub csm_id: Option<String>,
    pub renewal_due_date: NaiveDate,
    // Activity aggregate
    pub total_events: i64,
    pub events_30d: i64,
    pub events_60d: i64,
    pub events_90d: i64,
    pub active_days_30d: i64,
    pub active_days_60d: i64,
    pub active_days_90d: i64,
    pub last_activity: Option<NaiveDateTime>,
    pub days_since_last_activity: i64,
    pub total_logins: i64,
    pub avg_session_length: f64,
    pub logins_30d: i64,
    pub avg_session_30d: f64,
    pub property_added_count: i64,
    pub tenant_added_count: i64,
    pub lease_signed_count: i64,
    pub rent_payment_received_count: i64,
    pub maintenance_request_created_count: i64,
    pub report_generated_count: i64,
    pub total_rent_collected: f64,
    pub features_adopted: i64,
    pub unique_features: i64,
    pub trainings_attended: i64,
    pub unique_training_types: i64,
    // Derived features
    pub account_age_days: i64,
    pub days_to_renewal: i64,
    pub engagement_declining: bool,
    pub activity_trend: f64,
    // Health
    pub usage_component: f64,
    pub business_value_component: f64,
    pub sentiment_component: f64,
    pub engagement_component: f64,
    pub health_score: f64,
    pub health_tier: HealthTier,
    pub at_renewal_risk: bool,
    // Churn risk
    pub rule_churn_probability: f64,
    pub rule_churn_tier: RiskTier,
    pub ml_churn_probability: f64,
    pub ml_churn_tier: RiskTier,
}

/// Join every stage into one row per account, in account order.
pub fn assemble(
    accounts: &[Account],
    aggregates: &BTreeMap<UserId, ActivityAggregate>,
    derived: &BTreeMap<UserId, DerivedFeatures>,
    health: &BTreeMap<UserId, HealthScore>,
    rule_risks: &BTreeMap<UserId, ChurnRisk>,
    ml_risks: &BTreeMap<UserId, ChurnRisk>,
) -> PipelineResult<Vec<MasterRecord>> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut records = Vec::with_capacity(accounts.len());

    for account in accounts {
        if !seen.insert(account.user_id.as_str()) {
            return Err(PipelineError::DuplicateUser {
                user_id: account.user_id.clone(),
            });
        }

        let aggregate = match aggregates.get(&account.user_id) {
            Some(aggregate) => aggregate.clone(),
            None => {
                log::debug!("user {}: no events, joining the all-zero aggregate", account.user_id);
                ActivityAggregate::zero(&account.user_id)
            }
        };
        let derived = lookup(derived, &account.user_id, "derived_features")?;
        let health = lookup(health, &account.user_id, "health_score")?;
        let rule = lookup(rule_risks, &account.user_id, "rule_risk")?;
        let ml = lookup(ml_risks, &account.user_id, "ml_risk")?;

        records.push(MasterRecord {
            user_id: account.user_id.clone(),
            signup_date: account.signup_date,
            plan_type: account.plan_type,
            portfolio_size: account.portfolio_size,
            annual_revenue: account.annual_revenue,
            is_active: account.is_active,
            nps_score: account.nps_score,
            support_tickets_last_90d: account.support_tickets_last_90d,
            success_manager_assigned: account.success_manager_assigned,
            csm_id: account.csm_id.clone(),
            renewal_due_date: account.renewal_due_date,
            total_events: aggregate.total_events,
            events_30d: aggregate.events_30d,
            events_60d: aggregate.events_60d,
            events_90d: aggregate.events_90d,
            active_days_30d: aggregate.active_days_30d,
            active_days_60d: aggregate.active_days_60d,
            active_days_90d: aggregate.active_days_90d,
            last_activity: aggregate.last_activity,
            days_since_last_activity: aggregate.days_since_last_activity,
            total_logins: aggregate.total_logins,
            avg_session_length: aggregate.avg_session_length,
            logins_30d: aggregate.logins_30d,
            avg_session_30d: aggregate.avg_session_30d,
            property_added_count: aggregate.property_added_count,
            tenant_added_count: aggregate.tenant_added_count,
            lease_signed_count: aggregate.lease_signed_count,
            rent_payment_received_count: aggregate.rent_payment_received_count,
            maintenance_request_created_count: aggregate.maintenance_request_created_count,
            report_generated_count: aggregate.report_generated_count,
            total_rent_collected: aggregate.total_rent_collected,
            features_adopted: aggregate.features_adopted,
            unique_features: aggregate.unique_features,
            trainings_attended: aggregate.trainings_attended,
            unique_training_types: aggregate.unique_training_types,
            account_age_days: derived.account_age_days,
            days_to_renewal: derived.days_to_renewal,
            engagement_declining: derived.engagement_declining,
            activity_trend: derived.activity_trend,
            usage_component: health.usage_component,
            business_value_component: health.business_value_component,
            sentiment_component: health.sentiment_component,
            engagement_component: health.engagement_component,
            health_score: health.overall,
            health_tier: health.tier,
            at_renewal_risk: health.at_renewal_risk,
            rule_churn_probability: rule.probability,
            rule_churn_tier: rule.tier,
            ml_churn_probability: ml.probability,
            ml_churn_tier: ml.tier,
        });
    }

    Ok(records)
}

fn lookup<'a, T>(
    map: &'a BTreeMap<UserId, T>,
    user_id: &str,
    stage: &'static str,
) -> PipelineResult<&'a T> {
    map.get(user_id).ok_or_else(|| PipelineError::IncompleteJoin {
        user_id: user_id.to_string(),
        stage,
    })
}
