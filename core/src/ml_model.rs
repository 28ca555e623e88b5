//! Random-forest churn classifier — featurization, training and
//! evaluation.
//!
//! The label is churn: a user whose account is no longer active. The
//! feature vector is 29-wide and includes the four health components
//! (never the overall score, which is a tier product, not a model
//! input). Training holds out a stratified 30% test fold and reports
//! rank-based ROC-AUC, accuracy, precision/recall/F1 for the churned
//! class, the confusion matrix, and ranked feature importances.

use crate::account::PlanType;
use crate::forest::{ForestConfig, RandomForest};
use crate::risk::{ChurnRisk, ChurnRiskModel, RiskTier, UserSnapshot};
use crate::rng::{StreamRng, StreamSlot};
use serde::{Deserialize, Serialize};

/// Tier cut points for this model: [0, 0.4) low, [0.4, 0.7) medium.
pub const MEDIUM_RISK_AT: f64 = 0.40;
pub const HIGH_RISK_AT: f64 = 0.70;

const TEST_FRACTION: f64 = 0.30;
const DECISION_THRESHOLD: f64 = 0.50;

pub const FEATURE_COUNT: usize = 29;

/// Model feature order. Persisted importances index into this array,
/// so the order is part of the stored contract — append only.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "account_age_days",
    "portfolio_size",
    "annual_revenue",
    "success_manager_assigned",
    "active_days_30d",
    "active_days_60d",
    "active_days_90d",
    "logins_30d",
    "avg_session_30d",
    "total_events",
    "events_30d",
    "events_60d",
    "days_since_last_activity",
    "property_added_count",
    "tenant_added_count",
    "lease_signed_count",
    "report_generated_count",
    "unique_features",
    "trainings_attended",
    "nps_score",
    "support_tickets_last_90d",
    "usage_component",
    "business_value_component",
    "sentiment_component",
    "engagement_component",
    "plan_premium",
    "plan_pro",
    "plan_starter",
    "engagement_declining",
];

pub fn featurize(user: &UserSnapshot<'_>) -> [f64; FEATURE_COUNT] {
    let account = user.account;
    let aggregate = user.aggregate;
    let derived = user.derived;
    let health = user.health;

    [
        derived.account_age_days as f64,
        account.portfolio_size as f64,
        account.annual_revenue,
        flag(account.success_manager_assigned),
        aggregate.active_days_30d as f64,
        aggregate.active_days_60d as f64,
        aggregate.active_days_90d as f64,
        aggregate.logins_30d as f64,
        aggregate.avg_session_30d,
        aggregate.total_events as f64,
        aggregate.events_30d as f64,
        aggregate.events_60d as f64,
        aggregate.days_since_last_activity as f64,
        aggregate.property_added_count as f64,
        aggregate.tenant_added_count as f64,
        aggregate.lease_signed_count as f64,
        aggregate.report_generated_count as f64,
        aggregate.unique_features as f64,
        aggregate.trainings_attended as f64,
        account.nps_score,
        account.support_tickets_last_90d as f64,
        health.usage_component,
        health.business_value_component,
        health.sentiment_component,
        health.engagement_component,
        flag(account.plan_type == PlanType::Premium),
        flag(account.plan_type == PlanType::Pro),
        flag(account.plan_type == PlanType::Starter),
        flag(derived.engagement_declining),
    ]
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

// ── Evaluation records ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negatives: i64,
    pub false_positives: i64,
    pub false_negatives: i64,
    pub true_positives: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub train_rows: usize,
    pub test_rows: usize,
    pub churned_in_train: usize,
    pub churned_in_test: usize,
    pub roc_auc: f64,
    pub accuracy: f64,
    /// Precision for the churned class at the 0.5 decision threshold.
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub confusion: ConfusionMatrix,
    /// Ranked descending; ties keep feature order.
    pub feature_importance: Vec<FeatureImportance>,
}

/// Everything about one training round worth persisting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
    pub model_id: String,
    pub config: ForestConfig,
    pub evaluation: ModelEvaluation,
}

// ── Training ─────────────────────────────────────────────────────────────────

pub struct TrainedChurnModel {
    pub model_id: String,
    pub config: ForestConfig,
    pub evaluation: ModelEvaluation,
    forest: RandomForest,
}

impl TrainedChurnModel {
    /// Train on the full scored population: stratified 70/30 split,
    /// forest fit on the training fold, metrics on the held-out fold.
    /// The split and the forest both derive from `config.seed`, so the
    /// same population and config always yield the same model.
    pub fn train(users: &[UserSnapshot<'_>], config: &ForestConfig) -> Self {
        let rows: Vec<Vec<f64>> = users.iter().map(|user| featurize(user).to_vec()).collect();
        let labels: Vec<bool> = users.iter().map(|user| !user.account.is_active).collect();

        let split = stratified_split(&labels, TEST_FRACTION, config.seed);
        let train_rows: Vec<Vec<f64>> = split.train.iter().map(|&i| rows[i].clone()).collect();
        let train_labels: Vec<bool> = split.train.iter().map(|&i| labels[i]).collect();
        let test_rows: Vec<Vec<f64>> = split.test.iter().map(|&i| rows[i].clone()).collect();
        let test_labels: Vec<bool> = split.test.iter().map(|&i| labels[i]).collect();

        let forest = RandomForest::fit(&train_rows, &train_labels, config);
        let evaluation = evaluate(&forest, &test_rows, &test_labels, &train_labels);

        Self {
            model_id: uuid::Uuid::new_v4().to_string(),
            config: *config,
            evaluation,
            forest,
        }
    }

    pub fn report(&self) -> ModelReport {
        ModelReport {
            model_id: self.model_id.clone(),
            config: self.config,
            evaluation: self.evaluation.clone(),
        }
    }
}

impl ChurnRiskModel for TrainedChurnModel {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn score(&self, user: &UserSnapshot<'_>) -> ChurnRisk {
        let probability = self.forest.predict_proba(&featurize(user));
        ChurnRisk {
            probability,
            tier: RiskTier::from_probability(probability, MEDIUM_RISK_AT, HIGH_RISK_AT),
        }
    }
}

struct SplitIndices {
    train: Vec<usize>,
    test: Vec<usize>,
}

/// Stratified split: shuffle each class separately, hold out
/// floor(class_size * fraction) rows per class. Indices come back
/// sorted so downstream iteration order is input order.
fn stratified_split(labels: &[bool], test_fraction: f64, seed: u64) -> SplitIndices {
    let mut rng = StreamRng::new(seed, StreamSlot::Split as u64);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [false, true] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == class)
            .map(|(index, _)| index)
            .collect();
        rng.shuffle(&mut members);

        let held_out = (members.len() as f64 * test_fraction).floor() as usize;
        test.extend(members.iter().take(held_out));
        train.extend(members.iter().skip(held_out));
    }

    train.sort_unstable();
    test.sort_unstable();
    SplitIndices { train, test }
}

fn evaluate(
    forest: &RandomForest,
    test_rows: &[Vec<f64>],
    test_labels: &[bool],
    train_labels: &[bool],
) -> ModelEvaluation {
    let probabilities: Vec<f64> = test_rows.iter().map(|row| forest.predict_proba(row)).collect();

    let mut confusion = ConfusionMatrix::default();
    for (p, &label) in probabilities.iter().zip(test_labels) {
        let predicted = *p >= DECISION_THRESHOLD;
        match (label, predicted) {
            (true, true) => confusion.true_positives += 1,
            (true, false) => confusion.false_negatives += 1,
            (false, true) => confusion.false_positives += 1,
            (false, false) => confusion.true_negatives += 1,
        }
    }

    let total = test_labels.len() as f64;
    let tp = confusion.true_positives as f64;
    let fp = confusion.false_positives as f64;
    let fn_ = confusion.false_negatives as f64;
    let tn = confusion.true_negatives as f64;

    let accuracy = if total > 0.0 { (tp + tn) / total } else { 0.0 };
    let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
    let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    let mut feature_importance: Vec<FeatureImportance> = FEATURE_NAMES
        .iter()
        .zip(forest.feature_importance())
        .map(|(name, &importance)| FeatureImportance {
            feature: name.to_string(),
            importance,
        })
        .collect();
    // Stable sort: equal importances keep feature order.
    feature_importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    ModelEvaluation {
        train_rows: train_labels.len(),
        test_rows: test_labels.len(),
        churned_in_train: train_labels.iter().filter(|&&label| label).count(),
        churned_in_test: test_labels.iter().filter(|&&label| label).count(),
        roc_auc: rank_roc_auc(&probabilities, test_labels),
        accuracy,
        precision,
        recall,
        f1,
        confusion,
        feature_importance,
    }
}

/// Rank-based ROC-AUC (Mann-Whitney). Tied probabilities share their
/// average rank. A single-class fold cannot be ranked; it reports 0.5.
fn rank_roc_auc(probabilities: &[f64], labels: &[bool]) -> f64 {
    let positives = labels.iter().filter(|&&label| label).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        log::warn!("test fold holds a single class; reporting roc_auc=0.5");
        return 0.5;
    }

    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| probabilities[a].total_cmp(&probabilities[b]));

    let mut ranks = vec![0.0; probabilities.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probabilities[order[j + 1]] == probabilities[order[i]] {
            j += 1;
        }
        // 1-based ranks; a tie group shares the average of its span.
        let shared = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = shared;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(&label, _)| label)
        .map(|(_, &rank)| rank)
        .sum();
    let n_pos = positives as f64;
    let n_neg = negatives as f64;
    (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}
