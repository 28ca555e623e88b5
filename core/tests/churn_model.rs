//! Random-forest churn model tests: the feature contract, training
//! metrics on a synthetic population, and reproducibility.

use chrono::{NaiveDate, NaiveDateTime};
use cxhealth_core::account::Account;
use cxhealth_core::aggregate::{aggregate_events, ActivityAggregate};
use cxhealth_core::features::{self, DerivedFeatures};
use cxhealth_core::forest::ForestConfig;
use cxhealth_core::health::{score_user, HealthScore};
use cxhealth_core::ml_model::{
    featurize, TrainedChurnModel, FEATURE_COUNT, FEATURE_NAMES, HIGH_RISK_AT, MEDIUM_RISK_AT,
};
use cxhealth_core::pipeline::Pipeline;
use cxhealth_core::population::PopulationStats;
use cxhealth_core::risk::{ChurnRiskModel, RiskTier, UserSnapshot};
use cxhealth_core::synthetic::generate_population;
use std::collections::{BTreeMap, BTreeSet};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn as_of() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Owns the full scored state of a synthetic population so snapshots
/// can borrow from it. Mirrors the pipeline's own stage order.
struct Prepared {
    accounts: Vec<Account>,
    aggregates: BTreeMap<String, ActivityAggregate>,
    derived: BTreeMap<String, DerivedFeatures>,
    health: BTreeMap<String, HealthScore>,
}

impl Prepared {
    fn build(user_count: usize, seed: u64) -> Self {
        let (accounts, events) = generate_population(user_count, seed, as_of());

        let mut aggregates = aggregate_events(&events, as_of());
        for account in &accounts {
            aggregates
                .entry(account.user_id.clone())
                .or_insert_with(|| ActivityAggregate::zero(&account.user_id));
        }

        let mut derived = BTreeMap::new();
        for account in &accounts {
            let record = features::derive(account, &aggregates[&account.user_id], as_of());
            derived.insert(account.user_id.clone(), record);
        }

        let stats = PopulationStats::collect(accounts.iter().map(|account| {
            (
                account,
                &aggregates[&account.user_id],
                &derived[&account.user_id],
            )
        }));

        let mut health = BTreeMap::new();
        for account in &accounts {
            let score = score_user(
                account,
                &aggregates[&account.user_id],
                &derived[&account.user_id],
                &stats,
            );
            health.insert(account.user_id.clone(), score);
        }

        Self {
            accounts,
            aggregates,
            derived,
            health,
        }
    }

    fn snapshots(&self) -> Vec<UserSnapshot<'_>> {
        self.accounts
            .iter()
            .map(|account| UserSnapshot {
                account,
                aggregate: &self.aggregates[&account.user_id],
                derived: &self.derived[&account.user_id],
                health: &self.health[&account.user_id],
            })
            .collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// The feature contract: 29 names, all distinct, matching the vector
/// width.
#[test]
fn feature_names_match_vector_width() {
    assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
    let unique: BTreeSet<&str> = FEATURE_NAMES.iter().copied().collect();
    assert_eq!(unique.len(), FEATURE_COUNT);
}

/// Featurization maps fields to their locked positions; the plan
/// one-hots are mutually exclusive.
#[test]
fn featurize_maps_fields_to_locked_positions() {
    let prepared = Prepared::build(8, 3);
    let snapshots = prepared.snapshots();

    for user in &snapshots {
        let row = featurize(user);
        assert_eq!(row.len(), FEATURE_COUNT);
        assert_eq!(row[0], user.derived.account_age_days as f64);
        assert_eq!(row[1], user.account.portfolio_size as f64);
        assert_eq!(row[2], user.account.annual_revenue);
        assert_eq!(row[12], user.aggregate.days_since_last_activity as f64);
        assert_eq!(row[21], user.health.usage_component);
        assert_eq!(row[24], user.health.engagement_component);
        let plan_one_hots = row[25] + row[26] + row[27];
        assert!(plan_one_hots == 0.0 || plan_one_hots == 1.0);
        let declining = if user.derived.engagement_declining { 1.0 } else { 0.0 };
        assert_eq!(row[28], declining);
    }
}

/// 240 synthetic users, stratified 70/30: both folds keep both classes
/// and the forest comfortably beats a coin flip on the held-out fold.
#[test]
fn training_separates_synthetic_churners() {
    let prepared = Prepared::build(240, 7);
    let model = TrainedChurnModel::train(&prepared.snapshots(), &ForestConfig::default());
    let eval = &model.evaluation;

    assert_eq!(eval.train_rows + eval.test_rows, 240);
    assert!(eval.churned_in_train > 0, "train fold lost the churned class");
    assert!(eval.churned_in_test > 0, "test fold lost the churned class");
    assert!(
        eval.roc_auc > 0.55 && eval.roc_auc <= 1.0,
        "roc_auc {} barely beats random",
        eval.roc_auc
    );
    assert!(eval.accuracy > 0.0 && eval.accuracy <= 1.0);

    let c = eval.confusion;
    let cells = c.true_negatives + c.false_positives + c.false_negatives + c.true_positives;
    assert_eq!(cells as usize, eval.test_rows);
}

/// Same snapshots, same config: identical metrics and identical
/// per-user probabilities. Only the model id (a uuid) differs.
#[test]
fn training_is_reproducible() {
    let prepared = Prepared::build(160, 11);
    let snapshots = prepared.snapshots();
    let config = ForestConfig::default();

    let first = TrainedChurnModel::train(&snapshots, &config);
    let second = TrainedChurnModel::train(&snapshots, &config);

    assert_eq!(
        serde_json::to_string(&first.evaluation).unwrap(),
        serde_json::to_string(&second.evaluation).unwrap()
    );
    for snapshot in &snapshots {
        assert_eq!(
            first.score(snapshot).probability,
            second.score(snapshot).probability
        );
    }
    assert_ne!(first.model_id, second.model_id);
}

/// Importances come back ranked descending and sum to 1 once any split
/// has real gain.
#[test]
fn importances_rank_descending_and_sum_to_one() {
    let prepared = Prepared::build(240, 7);
    let model = TrainedChurnModel::train(&prepared.snapshots(), &ForestConfig::default());
    let importance = &model.evaluation.feature_importance;

    assert_eq!(importance.len(), FEATURE_COUNT);
    for pair in importance.windows(2) {
        assert!(
            pair[0].importance >= pair[1].importance,
            "{} ranked above {}",
            pair[1].feature,
            pair[0].feature
        );
    }
    let sum: f64 = importance.iter().map(|f| f.importance).sum();
    assert!((sum - 1.0).abs() < 1e-6, "importance sum {sum}");
}

/// Every probability stays in [0, 1] and its tier matches the model's
/// cut points.
#[test]
fn scores_stay_in_probability_range() {
    let prepared = Prepared::build(120, 5);
    let snapshots = prepared.snapshots();
    let model = TrainedChurnModel::train(&snapshots, &ForestConfig::default());

    assert_eq!(model.name(), "random_forest");
    for snapshot in &snapshots {
        let risk = model.score(snapshot);
        assert!((0.0..=1.0).contains(&risk.probability));
        assert_eq!(
            risk.tier,
            RiskTier::from_probability(risk.probability, MEDIUM_RISK_AT, HIGH_RISK_AT)
        );
    }
}

/// Tier cut points for the forest: [0, 0.4) low, [0.4, 0.7) medium.
#[test]
fn tier_cut_points_are_inclusive_above() {
    for (p, expected) in [
        (0.3999, RiskTier::Low),
        (0.40, RiskTier::Medium),
        (0.6999, RiskTier::Medium),
        (0.70, RiskTier::High),
    ] {
        assert_eq!(RiskTier::from_probability(p, MEDIUM_RISK_AT, HIGH_RISK_AT), expected);
    }
}

/// The persisted report mirrors the trained model.
#[test]
fn report_mirrors_the_trained_model() {
    let prepared = Prepared::build(80, 13);
    let model = TrainedChurnModel::train(&prepared.snapshots(), &ForestConfig::default());
    let report = model.report();

    assert_eq!(report.model_id, model.model_id);
    assert_eq!(report.config.seed, model.config.seed);
    assert_eq!(report.config.tree_count, model.config.tree_count);
    assert_eq!(report.evaluation.train_rows, model.evaluation.train_rows);
    assert_eq!(report.evaluation.roc_auc, model.evaluation.roc_auc);
}

/// A pipeline built around an already trained model must not retrain:
/// the run report carries the original model id.
#[test]
fn pipeline_reuses_a_given_model() {
    let prepared = Prepared::build(160, 11);
    let model = TrainedChurnModel::train(&prepared.snapshots(), &ForestConfig::default());
    let model_id = model.model_id.clone();

    let (accounts, events) = generate_population(160, 11, as_of());
    let mut pipeline = Pipeline::with_model(model);
    let run = pipeline.run(&accounts, &events, as_of()).unwrap();

    assert_eq!(run.model_report.model_id, model_id);
}
