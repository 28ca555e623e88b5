//! Event aggregation — first pipeline stage.
//!
//! Collapses the raw event log into one activity record per user,
//! windowed at 30/60/90 days behind the reference instant. Windows are
//! cumulative: an event 10 days old counts in all three. Users that
//! never appear in the log get the all-zero record with the inactivity
//! sentinel, so downstream stages never special-case them.

use crate::event::{Event, EventKind};
use crate::types::UserId;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Days-since-last-activity reported for users with no events at all.
/// Deep past every recency band, so scoring treats them as fully cold.
pub const INACTIVITY_SENTINEL_DAYS: i64 = 999;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityAggregate {
    pub user_id: UserId,
    // Raw event volume
    pub total_events: i64,
    pub events_30d: i64,
    pub events_60d: i64,
    pub events_90d: i64,
    // Distinct calendar dates carrying at least one event
    pub active_days_30d: i64,
    pub active_days_60d: i64,
    pub active_days_90d: i64,
    // Recency
    pub last_activity: Option<NaiveDateTime>,
    pub days_since_last_activity: i64,
    // Logins
    pub total_logins: i64,
    pub avg_session_length: f64,
    pub logins_30d: i64,
    pub avg_session_30d: f64,
    // Core product actions
    pub property_added_count: i64,
    pub tenant_added_count: i64,
    pub lease_signed_count: i64,
    pub rent_payment_received_count: i64,
    pub maintenance_request_created_count: i64,
    pub report_generated_count: i64,
    pub total_rent_collected: f64,
    // Adoption and enablement
    pub features_adopted: i64,
    pub unique_features: i64,
    pub trainings_attended: i64,
    pub unique_training_types: i64,
}

impl ActivityAggregate {
    /// The record a user with no events at all receives.
    pub fn zero(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_events: 0,
            events_30d: 0,
            events_60d: 0,
            events_90d: 0,
            active_days_30d: 0,
            active_days_60d: 0,
            active_days_90d: 0,
            last_activity: None,
            days_since_last_activity: INACTIVITY_SENTINEL_DAYS,
            total_logins: 0,
            avg_session_length: 0.0,
            logins_30d: 0,
            avg_session_30d: 0.0,
            property_added_count: 0,
            tenant_added_count: 0,
            lease_signed_count: 0,
            rent_payment_received_count: 0,
            maintenance_request_created_count: 0,
            report_generated_count: 0,
            total_rent_collected: 0.0,
            features_adopted: 0,
            unique_features: 0,
            trainings_attended: 0,
            unique_training_types: 0,
        }
    }
}

// ── Accumulation ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Accum<'a> {
    total_events: i64,
    events_30d: i64,
    events_60d: i64,
    events_90d: i64,
    dates_30d: BTreeSet<NaiveDate>,
    dates_60d: BTreeSet<NaiveDate>,
    dates_90d: BTreeSet<NaiveDate>,
    last_activity: Option<NaiveDateTime>,
    total_logins: i64,
    logins_30d: i64,
    session_sum: f64,
    session_count: i64,
    session_sum_30d: f64,
    session_count_30d: i64,
    property_added: i64,
    tenant_added: i64,
    lease_signed: i64,
    rent_payments: i64,
    maintenance_requests: i64,
    reports_generated: i64,
    rent_collected: f64,
    feature_adoptions: i64,
    feature_names: BTreeSet<&'a str>,
    trainings: i64,
    training_types: BTreeSet<&'a str>,
}

impl<'a> Accum<'a> {
    fn finalize(self, user_id: &str, as_of: NaiveDateTime) -> ActivityAggregate {
        let days_since_last_activity = match self.last_activity {
            Some(last) => as_of.signed_duration_since(last).num_days(),
            None => INACTIVITY_SENTINEL_DAYS,
        };
        ActivityAggregate {
            user_id: user_id.to_string(),
            total_events: self.total_events,
            events_30d: self.events_30d,
            events_60d: self.events_60d,
            events_90d: self.events_90d,
            active_days_30d: self.dates_30d.len() as i64,
            active_days_60d: self.dates_60d.len() as i64,
            active_days_90d: self.dates_90d.len() as i64,
            last_activity: self.last_activity,
            days_since_last_activity,
            total_logins: self.total_logins,
            avg_session_length: mean(self.session_sum, self.session_count),
            logins_30d: self.logins_30d,
            avg_session_30d: mean(self.session_sum_30d, self.session_count_30d),
            property_added_count: self.property_added,
            tenant_added_count: self.tenant_added,
            lease_signed_count: self.lease_signed,
            rent_payment_received_count: self.rent_payments,
            maintenance_request_created_count: self.maintenance_requests,
            report_generated_count: self.reports_generated,
            total_rent_collected: self.rent_collected,
            features_adopted: self.feature_adoptions,
            unique_features: self.feature_names.len() as i64,
            trainings_attended: self.trainings,
            unique_training_types: self.training_types.len() as i64,
        }
    }
}

/// Session averages run over logins that carry a numeric payload;
/// payload-less logins count toward login totals but not the mean.
fn mean(sum: f64, count: i64) -> f64 {
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

/// Fold the event log into per-user activity records, windowed against
/// `as_of`. Window membership is inclusive: an event exactly N days old
/// is inside the N-day window. Users absent from the log are absent
/// from the result; callers backfill them with [`ActivityAggregate::zero`].
pub fn aggregate_events(events: &[Event], as_of: NaiveDateTime) -> BTreeMap<UserId, ActivityAggregate> {
    let cutoff_30 = as_of - Duration::days(30);
    let cutoff_60 = as_of - Duration::days(60);
    let cutoff_90 = as_of - Duration::days(90);

    let mut accums: BTreeMap<&str, Accum<'_>> = BTreeMap::new();

    for event in events {
        let acc = accums.entry(event.user_id.as_str()).or_default();
        let at = event.occurred_at;

        acc.total_events += 1;
        if at >= cutoff_30 {
            acc.events_30d += 1;
            acc.dates_30d.insert(at.date());
        }
        if at >= cutoff_60 {
            acc.events_60d += 1;
            acc.dates_60d.insert(at.date());
        }
        if at >= cutoff_90 {
            acc.events_90d += 1;
            acc.dates_90d.insert(at.date());
        }

        acc.last_activity = Some(match acc.last_activity {
            Some(prev) if prev >= at => prev,
            _ => at,
        });

        match event.kind {
            EventKind::Login => {
                acc.total_logins += 1;
                if at >= cutoff_30 {
                    acc.logins_30d += 1;
                }
                if let Some(minutes) = event.value_num {
                    acc.session_sum += minutes;
                    acc.session_count += 1;
                    if at >= cutoff_30 {
                        acc.session_sum_30d += minutes;
                        acc.session_count_30d += 1;
                    }
                }
            }
            EventKind::PropertyAdded => acc.property_added += 1,
            EventKind::TenantAdded => acc.tenant_added += 1,
            EventKind::LeaseSigned => acc.lease_signed += 1,
            EventKind::RentPaymentReceived => {
                acc.rent_payments += 1;
                acc.rent_collected += event.value_num.unwrap_or(0.0);
            }
            EventKind::MaintenanceRequestCreated => acc.maintenance_requests += 1,
            EventKind::ReportGenerated => acc.reports_generated += 1,
            EventKind::FeatureAdopted => {
                acc.feature_adoptions += 1;
                if let Some(name) = &event.value_txt {
                    acc.feature_names.insert(name.as_str());
                }
            }
            EventKind::TrainingAttended => {
                acc.trainings += 1;
                if let Some(course) = &event.value_txt {
                    acc.training_types.insert(course.as_str());
                }
            }
            EventKind::Other => {}
        }
    }

    accums
        .into_iter()
        .map(|(user_id, acc)| (user_id.to_string(), acc.finalize(user_id, as_of)))
        .collect()
}
