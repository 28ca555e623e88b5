//! Random forest classifier — CART trees over bootstrap bags.
//!
//! Hand-rolled because training must be bit-reproducible from the model
//! seed: every random draw (per-tree seeds, bootstrap bags, per-split
//! feature subsets) goes through the crate's PCG streams. No global
//! RNG, no threads.
//!
//! Class imbalance is handled with balanced class weights computed on
//! the training labels; Gini impurity, split gains and leaf
//! probabilities all use the weighted counts.

use crate::rng::{StreamRng, StreamSlot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForestConfig {
    pub tree_count: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            tree_count: 100,
            max_depth: 10,
            min_samples_split: 20,
            seed: 42,
        }
    }
}

// ── Trees ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        probability: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Positive-class probability for one feature row. Rows at exactly
    /// the threshold go left.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0usize;
        loop {
            match &self.nodes[index] {
                Node::Leaf { probability } => return *probability,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

// ── Growing ──────────────────────────────────────────────────────────────────

struct SplitChoice {
    feature: usize,
    threshold: f64,
    gain: f64,
    left_weight: f64,
    left_gini: f64,
    right_weight: f64,
    right_gini: f64,
}

struct TreeGrower<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [bool],
    class_weights: [f64; 2],
    features_per_split: usize,
    feature_count: usize,
    max_depth: usize,
    min_samples_split: usize,
    nodes: Vec<Node>,
    importance: Vec<f64>,
}

impl<'a> TreeGrower<'a> {
    fn weight_of(&self, sample: usize) -> f64 {
        self.class_weights[self.labels[sample] as usize]
    }

    fn node_weights(&self, samples: &[usize]) -> (f64, f64) {
        let mut total = 0.0;
        let mut positive = 0.0;
        for &sample in samples {
            let w = self.weight_of(sample);
            total += w;
            if self.labels[sample] {
                positive += w;
            }
        }
        (total, positive)
    }

    /// Grow the subtree for `samples`, returning its node index.
    fn grow(&mut self, samples: Vec<usize>, depth: usize, rng: &mut StreamRng) -> usize {
        let (weight, positive) = self.node_weights(&samples);
        let probability = if weight > 0.0 { positive / weight } else { 0.0 };
        let gini = gini_impurity(weight, positive);

        let must_stop = depth >= self.max_depth
            || samples.len() < self.min_samples_split
            || gini == 0.0;

        if !must_stop {
            if let Some(choice) = self.best_split(&samples, weight, positive, rng) {
                self.importance[choice.feature] += weight * gini
                    - choice.left_weight * choice.left_gini
                    - choice.right_weight * choice.right_gini;

                // Reserve the slot before recursing so child indices land after it.
                let index = self.nodes.len();
                self.nodes.push(Node::Leaf { probability });

                let mut left_samples = Vec::new();
                let mut right_samples = Vec::new();
                for sample in samples {
                    if self.rows[sample][choice.feature] <= choice.threshold {
                        left_samples.push(sample);
                    } else {
                        right_samples.push(sample);
                    }
                }

                let left = self.grow(left_samples, depth + 1, rng);
                let right = self.grow(right_samples, depth + 1, rng);
                self.nodes[index] = Node::Split {
                    feature: choice.feature,
                    threshold: choice.threshold,
                    left,
                    right,
                };
                return index;
            }
        }

        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { probability });
        index
    }

    /// Best weighted-Gini split over a fresh random feature subset.
    /// Candidate thresholds are midpoints between consecutive distinct
    /// values; ties on gain keep the first candidate seen.
    fn best_split(
        &self,
        samples: &[usize],
        weight: f64,
        positive: f64,
        rng: &mut StreamRng,
    ) -> Option<SplitChoice> {
        let parent_gini = gini_impurity(weight, positive);
        let features = sample_features(self.feature_count, self.features_per_split, rng);

        let mut best: Option<SplitChoice> = None;
        for feature in features {
            let mut ordered: Vec<(f64, f64, bool)> = samples
                .iter()
                .map(|&sample| {
                    (
                        self.rows[sample][feature],
                        self.weight_of(sample),
                        self.labels[sample],
                    )
                })
                .collect();
            ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_weight = 0.0;
            let mut left_positive = 0.0;
            for k in 0..ordered.len() - 1 {
                let (value, w, label) = ordered[k];
                left_weight += w;
                if label {
                    left_positive += w;
                }
                let next_value = ordered[k + 1].0;
                if next_value <= value {
                    continue;
                }

                let right_weight = weight - left_weight;
                let right_positive = positive - left_positive;
                let left_gini = gini_impurity(left_weight, left_positive);
                let right_gini = gini_impurity(right_weight, right_positive);
                let children = (left_weight * left_gini + right_weight * right_gini) / weight;
                let gain = parent_gini - children;

                let improves = match &best {
                    Some(current) => gain > current.gain,
                    None => gain > 1e-12,
                };
                if improves {
                    best = Some(SplitChoice {
                        feature,
                        threshold: 0.5 * (value + next_value),
                        gain,
                        left_weight,
                        left_gini,
                        right_weight,
                        right_gini,
                    });
                }
            }
        }
        best
    }
}

/// Binary Gini impurity from weighted counts.
fn gini_impurity(weight: f64, positive: f64) -> f64 {
    if weight <= 0.0 {
        return 0.0;
    }
    let p = positive / weight;
    2.0 * p * (1.0 - p)
}

/// Balanced class weights: n / (n_classes * count_c), indexed
/// [negative, positive]. An absent class keeps weight 1 and never draws.
fn balanced_class_weights(labels: &[bool]) -> [f64; 2] {
    let n = labels.len() as f64;
    let positives = labels.iter().filter(|&&label| label).count() as f64;
    let negatives = n - positives;
    [
        if negatives > 0.0 { n / (2.0 * negatives) } else { 1.0 },
        if positives > 0.0 { n / (2.0 * positives) } else { 1.0 },
    ]
}

/// Draw `count` distinct feature indices by partial Fisher-Yates.
fn sample_features(total: usize, count: usize, rng: &mut StreamRng) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..total).collect();
    let take = count.min(total);
    for i in 0..take {
        let j = i + rng.next_u64_below((total - i) as u64) as usize;
        pool.swap(i, j);
    }
    pool.truncate(take);
    pool
}

// ── Forest ───────────────────────────────────────────────────────────────────

pub struct RandomForest {
    trees: Vec<DecisionTree>,
    importance: Vec<f64>,
    feature_count: usize,
}

impl RandomForest {
    /// Train on the given rows. Each tree gets a bootstrap bag the size
    /// of the training set and its own seed drawn from the forest
    /// stream; splits subsample floor(sqrt(d)) features. Fitting an
    /// empty set yields a forest that predicts 0.
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], config: &ForestConfig) -> Self {
        let feature_count = rows.first().map(|row| row.len()).unwrap_or(0);
        let mut importance = vec![0.0; feature_count];

        if rows.is_empty() || feature_count == 0 {
            return Self {
                trees: Vec::new(),
                importance,
                feature_count,
            };
        }

        let class_weights = balanced_class_weights(labels);
        let features_per_split = ((feature_count as f64).sqrt().floor() as usize).max(1);
        let mut seed_rng = StreamRng::new(config.seed, StreamSlot::Forest as u64);

        let mut trees = Vec::with_capacity(config.tree_count);
        for _ in 0..config.tree_count {
            let mut tree_rng = StreamRng::from_raw_seed(seed_rng.next_u64());
            let bag: Vec<usize> = (0..rows.len())
                .map(|_| tree_rng.next_u64_below(rows.len() as u64) as usize)
                .collect();

            let mut grower = TreeGrower {
                rows,
                labels,
                class_weights,
                features_per_split,
                feature_count,
                max_depth: config.max_depth,
                min_samples_split: config.min_samples_split,
                nodes: Vec::new(),
                importance: vec![0.0; feature_count],
            };
            grower.grow(bag, 0, &mut tree_rng);

            // Mean decrease in impurity: normalize per tree, average later.
            let tree_total: f64 = grower.importance.iter().sum();
            if tree_total > 0.0 {
                for (acc, x) in importance.iter_mut().zip(&grower.importance) {
                    *acc += x / tree_total;
                }
            }
            trees.push(DecisionTree { nodes: grower.nodes });
        }

        let total: f64 = importance.iter().sum();
        if total > 0.0 {
            for x in importance.iter_mut() {
                *x /= total;
            }
        }

        Self {
            trees,
            importance,
            feature_count,
        }
    }

    /// Mean positive-class probability across all trees.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.predict(row)).sum();
        sum / self.trees.len() as f64
    }

    /// Normalized mean-decrease-in-impurity importances, one per
    /// feature, summing to 1 when any split happened.
    pub fn feature_importance(&self) -> &[f64] {
        &self.importance
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}
