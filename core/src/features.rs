//! Derived per-user features — second pipeline stage.
//!
//! Everything here is a pure function of one account, its activity
//! aggregate, and the reference instant. Day arithmetic truncates
//! toward zero; date-valued account fields anchor at midnight.

use crate::account::Account;
use crate::aggregate::ActivityAggregate;
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DerivedFeatures {
    pub account_age_days: i64,
    /// Negative once the renewal date has passed.
    pub days_to_renewal: i64,
    /// True when the 30-day window holds strictly fewer events than the
    /// 60-day window, i.e. any activity fell in the 31-60 day band.
    pub engagement_declining: bool,
    /// (events_30d - events_60d) / max(events_60d, 1). Windows are
    /// cumulative, so the trend is never positive.
    pub activity_trend: f64,
}

pub fn derive(account: &Account, aggregate: &ActivityAggregate, as_of: NaiveDateTime) -> DerivedFeatures {
    let signup = account.signup_date.and_time(NaiveTime::MIN);
    let renewal = account.renewal_due_date.and_time(NaiveTime::MIN);

    let account_age_days = as_of.signed_duration_since(signup).num_days();
    let days_to_renewal = renewal.signed_duration_since(as_of).num_days();

    let engagement_declining = aggregate.events_30d < aggregate.events_60d;
    let activity_trend = (aggregate.events_30d - aggregate.events_60d) as f64
        / (aggregate.events_60d.max(1)) as f64;

    DerivedFeatures {
        account_age_days,
        days_to_renewal,
        engagement_declining,
        activity_trend,
    }
}

/// Lifetime event rate with the age floored at one day, so day-zero
/// signups divide by 1 instead of 0.
pub fn events_per_day(total_events: i64, account_age_days: i64) -> f64 {
    total_events as f64 / account_age_days.max(1) as f64
}
