//! Dataset-wide normalizers — the reduce pass between aggregation and
//! scoring.
//!
//! RULE: Per-user scoring never scans the population. Every cross-user
//! quantity is computed here once and handed to scorers read-only, so
//! the per-user pass stays embarrassingly parallel.

use crate::account::Account;
use crate::aggregate::ActivityAggregate;
use crate::features::{self, DerivedFeatures};
use serde::{Deserialize, Serialize};

/// Maxima observed across the scored population. A maximum of zero
/// means the signal is absent everywhere; scorers then contribute zero
/// for the corresponding factor instead of dividing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationStats {
    pub max_annual_revenue: f64,
    pub max_days_since_last_activity: i64,
    pub max_events_per_day: f64,
    pub max_unique_features: i64,
}

impl PopulationStats {
    /// Reduce over the zero-filled user universe. Event-less users must
    /// already carry their sentinel aggregates so the inactivity maximum
    /// sees them.
    pub fn collect<'a, I>(rows: I) -> Self
    where
        I: Iterator<Item = (&'a Account, &'a ActivityAggregate, &'a DerivedFeatures)>,
    {
        let mut stats = Self {
            max_annual_revenue: 0.0,
            max_days_since_last_activity: 0,
            max_events_per_day: 0.0,
            max_unique_features: 0,
        };

        for (account, aggregate, derived) in rows {
            stats.max_annual_revenue = stats.max_annual_revenue.max(account.annual_revenue);
            stats.max_days_since_last_activity = stats
                .max_days_since_last_activity
                .max(aggregate.days_since_last_activity);
            let epd = features::events_per_day(aggregate.total_events, derived.account_age_days);
            stats.max_events_per_day = stats.max_events_per_day.max(epd);
            stats.max_unique_features = stats.max_unique_features.max(aggregate.unique_features);
        }

        stats
    }
}
