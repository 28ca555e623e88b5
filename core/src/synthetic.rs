//! Synthetic population generator — deterministic demo datasets.
//!
//! Four engagement archetypes drive both the account shape and the
//! event history, so a seeded dataset exercises every health tier and
//! both churn label classes without hand-built fixtures. All draws go
//! through the Synthetic stream; the same (count, seed, instant) always
//! generates the same tables.

use crate::account::{Account, PlanType};
use crate::event::{Event, EventKind};
use crate::rng::{RngBank, StreamRng, StreamSlot};
use chrono::{Duration, NaiveDateTime};

const FEATURE_POOL: [&str; 8] = [
    "rent_roll",
    "lease_templates",
    "maintenance_board",
    "owner_portal",
    "bank_sync",
    "late_fee_rules",
    "bulk_messaging",
    "tax_exports",
];

const TRAINING_POOL: [&str; 4] = [
    "onboarding_webinar",
    "reporting_deep_dive",
    "leasing_workshop",
    "accounting_basics",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Archetype {
    Thriving,
    Steady,
    Fading,
    Dormant,
}

/// Generate `user_count` accounts plus their event history, all dated
/// at or before `as_of`.
pub fn generate_population(
    user_count: usize,
    seed: u64,
    as_of: NaiveDateTime,
) -> (Vec<Account>, Vec<Event>) {
    let mut rng = RngBank::new(seed).for_stream(StreamSlot::Synthetic);
    let mut accounts = Vec::with_capacity(user_count);
    let mut events = Vec::new();

    for i in 0..user_count {
        let archetype = pick_archetype(&mut rng);
        let user_id = format!("u-{i:05}");
        let account = make_account(&user_id, archetype, as_of, &mut rng);
        generate_events(&account, archetype, as_of, &mut rng, &mut events);
        accounts.push(account);
    }

    (accounts, events)
}

fn pick_archetype(rng: &mut StreamRng) -> Archetype {
    let roll = rng.next_f64();
    if roll < 0.30 {
        Archetype::Thriving
    } else if roll < 0.70 {
        Archetype::Steady
    } else if roll < 0.90 {
        Archetype::Fading
    } else {
        Archetype::Dormant
    }
}

fn make_account(
    user_id: &str,
    archetype: Archetype,
    as_of: NaiveDateTime,
    rng: &mut StreamRng,
) -> Account {
    let plan_type = pick_plan(archetype, rng);

    let portfolio_size = match plan_type {
        PlanType::Premium => rng.range_i64(10, 80),
        PlanType::Pro => rng.range_i64(4, 40),
        PlanType::Starter | PlanType::Unknown => rng.range_i64(1, 12),
    };
    let per_unit_rate = match plan_type {
        PlanType::Premium => 900.0,
        PlanType::Pro => 600.0,
        PlanType::Starter | PlanType::Unknown => 350.0,
    };
    let annual_revenue = portfolio_size as f64 * per_unit_rate * (0.8 + rng.next_f64() * 0.4);

    let nps_score = match archetype {
        Archetype::Thriving => rng.range_i64(40, 95),
        Archetype::Steady => rng.range_i64(10, 70),
        Archetype::Fading => rng.range_i64(-40, 30),
        Archetype::Dormant => rng.range_i64(-80, 10),
    } as f64;

    let support_tickets_last_90d = match archetype {
        Archetype::Thriving => rng.range_i64(0, 3),
        Archetype::Steady => rng.range_i64(0, 6),
        Archetype::Fading => rng.range_i64(2, 12),
        Archetype::Dormant => rng.range_i64(0, 25),
    };

    let csm_chance = match plan_type {
        PlanType::Premium => 0.85,
        PlanType::Pro => 0.40,
        PlanType::Starter | PlanType::Unknown => 0.10,
    };
    let success_manager_assigned = rng.chance(csm_chance);
    let csm_id = if success_manager_assigned {
        Some(format!("csm-{:02}", rng.next_u64_below(8)))
    } else {
        None
    };

    let churn_chance = match archetype {
        Archetype::Thriving => 0.01,
        Archetype::Steady => 0.04,
        Archetype::Fading => 0.30,
        Archetype::Dormant => 0.75,
    };
    let is_active = !rng.chance(churn_chance);

    let signup_date = (as_of - Duration::days(rng.range_i64(90, 1400))).date();
    let renewal_due_date = (as_of + Duration::days(rng.range_i64(-20, 320))).date();

    Account {
        user_id: user_id.to_string(),
        signup_date,
        plan_type,
        portfolio_size,
        annual_revenue,
        is_active,
        nps_score,
        support_tickets_last_90d,
        success_manager_assigned,
        csm_id,
        renewal_due_date,
    }
}

fn pick_plan(archetype: Archetype, rng: &mut StreamRng) -> PlanType {
    let (premium, pro) = match archetype {
        Archetype::Thriving => (0.55, 0.35),
        Archetype::Steady => (0.25, 0.45),
        Archetype::Fading => (0.10, 0.40),
        Archetype::Dormant => (0.05, 0.25),
    };
    let roll = rng.next_f64();
    if roll < premium {
        PlanType::Premium
    } else if roll < premium + pro {
        PlanType::Pro
    } else {
        PlanType::Starter
    }
}

fn generate_events(
    account: &Account,
    archetype: Archetype,
    as_of: NaiveDateTime,
    rng: &mut StreamRng,
    out: &mut Vec<Event>,
) {
    let age_days = (as_of.date() - account.signup_date).num_days();
    let horizon = age_days.saturating_sub(1).min(365);

    // Days of silence before as_of. Dormant users went quiet long ago.
    let stop = match archetype {
        Archetype::Thriving => 1,
        Archetype::Steady => rng.range_i64(1, 5),
        Archetype::Fading => rng.range_i64(20, 45),
        Archetype::Dormant => rng.range_i64(120, 400),
    };
    if stop > horizon {
        return;
    }

    // Login cadence walk from most recent activity backwards.
    let mut day = stop;
    while day <= horizon {
        let at = event_time(as_of, day, rng);
        let session_minutes = match archetype {
            Archetype::Thriving => rng.range_i64(20, 65),
            Archetype::Steady => rng.range_i64(10, 40),
            Archetype::Fading => rng.range_i64(5, 25),
            Archetype::Dormant => rng.range_i64(3, 15),
        } as f64;
        out.push(Event::new(&account.user_id, EventKind::Login, at).with_num(session_minutes));

        let action_chance = match archetype {
            Archetype::Thriving => 0.10,
            Archetype::Steady => 0.06,
            Archetype::Fading => 0.03,
            Archetype::Dormant => 0.01,
        };
        if rng.chance(action_chance) {
            out.push(Event::new(&account.user_id, EventKind::PropertyAdded, at));
        }
        if rng.chance(action_chance * 1.5) {
            out.push(Event::new(&account.user_id, EventKind::TenantAdded, at));
        }
        if rng.chance(action_chance) {
            out.push(Event::new(&account.user_id, EventKind::LeaseSigned, at));
        }
        if rng.chance(0.25) {
            let amount = 500.0 + rng.next_f64() * 2500.0;
            out.push(Event::new(&account.user_id, EventKind::RentPaymentReceived, at).with_num(amount));
        }
        if rng.chance(0.08) {
            out.push(Event::new(&account.user_id, EventKind::MaintenanceRequestCreated, at));
        }
        let report_chance = match archetype {
            Archetype::Thriving => 0.20,
            Archetype::Steady => 0.10,
            Archetype::Fading => 0.04,
            Archetype::Dormant => 0.01,
        };
        if rng.chance(report_chance) {
            out.push(Event::new(&account.user_id, EventKind::ReportGenerated, at));
        }

        day += login_gap(archetype, day, rng);
    }

    // Feature adoption and trainings land anywhere in the active span.
    let adoption_count = match archetype {
        Archetype::Thriving => rng.range_i64(4, 8),
        Archetype::Steady => rng.range_i64(2, 5),
        Archetype::Fading => rng.range_i64(1, 3),
        Archetype::Dormant => rng.range_i64(0, 2),
    } as usize;
    for feature in pick_distinct(&FEATURE_POOL, adoption_count, rng) {
        let at = event_time(as_of, rng.range_i64(stop, horizon), rng);
        out.push(Event::new(&account.user_id, EventKind::FeatureAdopted, at).with_txt(feature));
    }

    let training_count = match archetype {
        Archetype::Thriving => rng.range_i64(2, 5),
        Archetype::Steady => rng.range_i64(1, 3),
        Archetype::Fading => rng.range_i64(0, 2),
        Archetype::Dormant => rng.range_i64(0, 1),
    };
    for _ in 0..training_count {
        let course = TRAINING_POOL[rng.next_u64_below(TRAINING_POOL.len() as u64) as usize];
        let at = event_time(as_of, rng.range_i64(stop, horizon), rng);
        out.push(Event::new(&account.user_id, EventKind::TrainingAttended, at).with_txt(course));
    }
}

/// Days between logins. Fading users thin out in their final weeks, so
/// their 30-day window trails the 60-day window.
fn login_gap(archetype: Archetype, days_ago: i64, rng: &mut StreamRng) -> i64 {
    match archetype {
        Archetype::Thriving => rng.range_i64(1, 2),
        Archetype::Steady => rng.range_i64(2, 5),
        Archetype::Fading => {
            if days_ago <= 45 {
                rng.range_i64(8, 18)
            } else {
                rng.range_i64(2, 5)
            }
        }
        Archetype::Dormant => rng.range_i64(5, 14),
    }
}

/// A timestamp `days_ago` whole days before the reference instant, with
/// up to twelve hours of jitter pushed further into the past. Never
/// lands after `as_of` because `days_ago` is at least 1.
fn event_time(as_of: NaiveDateTime, days_ago: i64, rng: &mut StreamRng) -> NaiveDateTime {
    as_of - Duration::days(days_ago.max(1)) - Duration::minutes(rng.range_i64(0, 720))
}

fn pick_distinct<'a>(pool: &[&'a str], count: usize, rng: &mut StreamRng) -> Vec<&'a str> {
    let mut indices: Vec<usize> = (0..pool.len()).collect();
    let take = count.min(pool.len());
    for i in 0..take {
        let j = i + rng.next_u64_below((pool.len() - i) as u64) as usize;
        indices.swap(i, j);
    }
    indices.truncate(take);
    indices.into_iter().map(|i| pool[i]).collect()
}
