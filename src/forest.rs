//! Class-weighted random forest over dense `f64` features with binary labels.
//!
//! Trees are CART with weighted Gini impurity. Each tree draws its own
//! bootstrap sample and feature subsets from a ChaCha stream keyed by
//! `(seed, tree index)`, so the fitted forest does not depend on how rayon
//! schedules the trees.

use log::debug;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::TrainError;
use crate::features::to_rows;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    All,
    Count(usize),
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let m = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(m) => m,
        };
        m.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub oob_score: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: Some(8),
            min_samples_split: 10,
            min_samples_leaf: 5,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            oob_score: true,
            seed: 42,
        }
    }
}

/// Per-class multipliers applied to every sample's weight during fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    pub no_stroke: f64,
    pub stroke: f64,
}

impl ClassWeights {
    pub fn uniform() -> Self {
        Self {
            no_stroke: 1.0,
            stroke: 1.0,
        }
    }

    /// `n_samples / (n_classes * count(class))` over the classes present in
    /// `labels`; a class that does not occur keeps weight 1.
    pub fn balanced(labels: &[u8]) -> Self {
        let positives = labels.iter().filter(|&&l| l == 1).count();
        let negatives = labels.len() - positives;
        let n_classes = usize::from(positives > 0) + usize::from(negatives > 0);
        let weight = |count: usize| {
            if count == 0 {
                1.0
            } else {
                labels.len() as f64 / (n_classes * count) as f64
            }
        };
        Self {
            no_stroke: weight(negatives),
            stroke: weight(positives),
        }
    }

    pub fn of(&self, label: u8) -> f64 {
        if label == 1 {
            self.stroke
        } else {
            self.no_stroke
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        proba: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// P(stroke = 1) at the leaf `row` lands in.
    pub fn predict_proba_row(&self, row: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { proba } => return *proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match &nodes[at] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

fn gini(w0: f64, w1: f64) -> f64 {
    let total = w0 + w1;
    if total <= 0.0 {
        return 0.0;
    }
    let p0 = w0 / total;
    let p1 = w1 / total;
    1.0 - p0 * p0 - p1 * p1
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    score: f64,
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [u8],
    weights: &'a [f64],
    config: &'a ForestConfig,
    mtry: usize,
    rng: ChaCha8Rng,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn class_weights(&self, indices: &[usize]) -> (f64, f64) {
        indices.iter().fold((0.0, 0.0), |(w0, w1), &i| {
            if self.labels[i] == 1 {
                (w0, w1 + self.weights[i])
            } else {
                (w0 + self.weights[i], w1)
            }
        })
    }

    fn build(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let (w0, w1) = self.class_weights(&indices);
        let total = w0 + w1;
        let proba = if total > 0.0 { w1 / total } else { 0.0 };

        let n = indices.len();
        let depth_reached = self.config.max_depth.map_or(false, |max| depth >= max);
        let too_small =
            n < self.config.min_samples_split || n < 2 * self.config.min_samples_leaf;
        let pure = w0 == 0.0 || w1 == 0.0;
        if depth_reached || too_small || pure {
            return self.leaf(proba);
        }

        let Some(split) = self.best_split(&indices) else {
            return self.leaf(proba);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.rows[i][split.feature] <= split.threshold);
        self.importances[split.feature] += total * gini(w0, w1) - split.score;

        let at = self.nodes.len();
        self.nodes.push(Node::Leaf { proba });
        let left = self.build(left, depth + 1);
        let right = self.build(right, depth + 1);
        self.nodes[at] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        at
    }

    fn leaf(&mut self, proba: f64) -> usize {
        self.nodes.push(Node::Leaf { proba });
        self.nodes.len() - 1
    }

    /// Lowest weighted child impurity over `mtry` randomly ordered features.
    /// When none of those admits a valid split, the remaining features are
    /// tried in the same order until one does.
    fn best_split(&mut self, indices: &[usize]) -> Option<BestSplit> {
        let n_features = self.rows[0].len();
        let order = index::sample(&mut self.rng, n_features, n_features);
        let min_leaf = self.config.min_samples_leaf.max(1);
        let n = indices.len();
        let (total0, total1) = self.class_weights(indices);

        let mut best: Option<BestSplit> = None;
        let mut sorted = indices.to_vec();
        for (visited, feature) in order.into_iter().enumerate() {
            if visited >= self.mtry && best.is_some() {
                break;
            }
            sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let (mut left0, mut left1) = (0.0, 0.0);
            for k in 0..n - 1 {
                let i = sorted[k];
                if self.labels[i] == 1 {
                    left1 += self.weights[i];
                } else {
                    left0 += self.weights[i];
                }

                let here = self.rows[i][feature];
                let next = self.rows[sorted[k + 1]][feature];
                if here == next {
                    continue;
                }
                let n_left = k + 1;
                if n_left < min_leaf || n - n_left < min_leaf {
                    continue;
                }

                let right0 = total0 - left0;
                let right1 = total1 - left1;
                let score = (left0 + left1) * gini(left0, left1) + (right0 + right1) * gini(right0, right1);
                if best.as_ref().map_or(true, |b| score < b.score) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        score,
                    });
                }
            }
        }
        best
    }
}

struct FittedTree {
    tree: DecisionTree,
    in_bag: Vec<bool>,
    importances: Vec<f64>,
}

fn fit_tree(
    rows: &[Vec<f64>],
    labels: &[u8],
    class_weights: &ClassWeights,
    config: &ForestConfig,
    tree_index: usize,
) -> FittedTree {
    let n = rows.len();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    rng.set_stream(tree_index as u64);

    let mut counts = vec![0usize; n];
    if config.bootstrap {
        for _ in 0..n {
            counts[rng.gen_range(0..n)] += 1;
        }
    } else {
        counts.iter_mut().for_each(|c| *c = 1);
    }

    let weights: Vec<f64> = counts
        .iter()
        .zip(labels)
        .map(|(&count, &label)| count as f64 * class_weights.of(label))
        .collect();
    let indices: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();

    let n_features = rows[0].len();
    let mut builder = TreeBuilder {
        rows,
        labels,
        weights: &weights,
        config,
        mtry: config.max_features.resolve(n_features),
        rng,
        nodes: Vec::new(),
        importances: vec![0.0; n_features],
    };
    builder.build(indices, 0);

    FittedTree {
        tree: DecisionTree {
            nodes: builder.nodes,
        },
        in_bag: counts.iter().map(|&c| c > 0).collect(),
        importances: builder.importances,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
    oob_score: Option<f64>,
}

impl RandomForest {
    pub fn fit(
        x: &DenseMatrix<f64>,
        y: &[u8],
        class_weights: &ClassWeights,
        config: &ForestConfig,
    ) -> Result<Self, TrainError> {
        Self::fit_rows(&to_rows(x), y, class_weights, config)
    }

    pub fn fit_rows(
        rows: &[Vec<f64>],
        y: &[u8],
        class_weights: &ClassWeights,
        config: &ForestConfig,
    ) -> Result<Self, TrainError> {
        if rows.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        if rows.len() != y.len() {
            return Err(TrainError::LengthMismatch {
                rows: rows.len(),
                labels: y.len(),
            });
        }
        let n_features = rows[0].len();

        let fitted: Vec<FittedTree> = (0..config.n_trees.max(1))
            .into_par_iter()
            .map(|t| fit_tree(rows, y, class_weights, config, t))
            .collect();

        let oob_score = if config.bootstrap && config.oob_score {
            oob_accuracy(rows, y, &fitted)
        } else {
            None
        };
        let feature_importances = mean_importances(&fitted, n_features);
        let trees: Vec<DecisionTree> = fitted.into_iter().map(|f| f.tree).collect();
        debug!(
            "fitted {} trees on {} rows, mean depth {:.1}",
            trees.len(),
            rows.len(),
            trees.iter().map(|t| t.depth() as f64).sum::<f64>() / trees.len() as f64
        );

        Ok(Self {
            trees,
            n_features,
            feature_importances,
            oob_score,
        })
    }

    /// Mean of the trees' leaf probabilities for the stroke class.
    pub fn predict_proba_row(&self, row: &[f64]) -> f64 {
        debug_assert_eq!(row.len(), self.n_features);
        self.trees
            .iter()
            .map(|tree| tree.predict_proba_row(row))
            .sum::<f64>()
            / self.trees.len() as f64
    }

    pub fn predict_row(&self, row: &[f64]) -> u8 {
        u8::from(self.predict_proba_row(row) > 0.5)
    }

    pub fn predict_proba(&self, x: &DenseMatrix<f64>) -> Vec<f64> {
        to_rows(x)
            .iter()
            .map(|row| self.predict_proba_row(row))
            .collect()
    }

    pub fn predict(&self, x: &DenseMatrix<f64>) -> Vec<u8> {
        to_rows(x).iter().map(|row| self.predict_row(row)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Normalized mean impurity decrease per feature; sums to 1 unless no tree split.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Accuracy on out-of-bag rows, when bootstrap and OOB scoring were enabled.
    pub fn oob_score(&self) -> Option<f64> {
        self.oob_score
    }
}

fn oob_accuracy(rows: &[Vec<f64>], y: &[u8], fitted: &[FittedTree]) -> Option<f64> {
    let mut scored = 0usize;
    let mut correct = 0usize;
    for (i, row) in rows.iter().enumerate() {
        let (sum, votes) = fitted
            .iter()
            .filter(|f| !f.in_bag[i])
            .fold((0.0, 0usize), |(sum, votes), f| {
                (sum + f.tree.predict_proba_row(row), votes + 1)
            });
        if votes == 0 {
            continue;
        }
        scored += 1;
        if u8::from(sum / votes as f64 > 0.5) == y[i] {
            correct += 1;
        }
    }
    if scored == 0 {
        None
    } else {
        Some(correct as f64 / scored as f64)
    }
}

fn mean_importances(fitted: &[FittedTree], n_features: usize) -> Vec<f64> {
    let mut mean = vec![0.0; n_features];
    let mut contributing = 0usize;
    for f in fitted.iter().filter(|f| f.tree.node_count() > 1) {
        let total: f64 = f.importances.iter().sum();
        if total <= 0.0 {
            continue;
        }
        contributing += 1;
        for (m, v) in mean.iter_mut().zip(&f.importances) {
            *m += v / total;
        }
    }
    let sum: f64 = mean.iter().sum();
    if contributing > 0 && sum > 0.0 {
        mean.iter_mut().for_each(|m| *m /= sum);
    }
    mean
}
