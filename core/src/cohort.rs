//! Signup-cohort retention — month-over-month activity grid.
//!
//! Users are bucketed by signup month ("YYYY-MM"); a cohort cell counts
//! distinct users active in month N after signup against the full
//! cohort size. Month arithmetic is calendar months, not 30-day spans.

use crate::account::Account;
use crate::event::Event;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortCell {
    pub cohort_month: String,
    pub months_since_signup: i64,
    pub cohort_size: usize,
    pub active_users: usize,
    /// Percent of the cohort active in this month.
    pub retention_rate: f64,
}

/// Cells come back sorted by (cohort month, month offset). Events for
/// users outside the registry are skipped, as are events timestamped
/// before their user's signup month.
pub fn cohort_retention(accounts: &[Account], events: &[Event]) -> Vec<CohortCell> {
    let mut cohort_of: BTreeMap<&str, (String, i64)> = BTreeMap::new();
    let mut cohort_sizes: BTreeMap<String, usize> = BTreeMap::new();

    for account in accounts {
        let label = format!(
            "{:04}-{:02}",
            account.signup_date.year(),
            account.signup_date.month()
        );
        let index = month_index(account.signup_date.year(), account.signup_date.month());
        *cohort_sizes.entry(label.clone()).or_insert(0) += 1;
        cohort_of.insert(account.user_id.as_str(), (label, index));
    }

    let mut active: BTreeMap<(String, i64), BTreeSet<&str>> = BTreeMap::new();
    for event in events {
        let (label, signup_index) = match cohort_of.get(event.user_id.as_str()) {
            Some(cohort) => cohort,
            None => continue,
        };
        let at = event.occurred_at;
        let offset = month_index(at.year(), at.month()) - signup_index;
        if offset < 0 {
            log::debug!("event for {} predates signup; skipping cohort cell", event.user_id);
            continue;
        }
        active
            .entry((label.clone(), offset))
            .or_default()
            .insert(event.user_id.as_str());
    }

    active
        .into_iter()
        .map(|((cohort_month, months_since_signup), users)| {
            let cohort_size = cohort_sizes.get(&cohort_month).copied().unwrap_or(0);
            let retention_rate = if cohort_size > 0 {
                users.len() as f64 / cohort_size as f64 * 100.0
            } else {
                0.0
            };
            CohortCell {
                cohort_month,
                months_since_signup,
                cohort_size,
                active_users: users.len(),
                retention_rate,
            }
        })
        .collect()
}

fn month_index(year: i32, month: u32) -> i64 {
    year as i64 * 12 + month as i64 - 1
}
