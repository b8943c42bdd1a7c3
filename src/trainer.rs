use std::collections::BTreeMap;

use log::{info, warn};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::TrainError;
use crate::features::to_rows;
use crate::forest::{ClassWeights, ForestConfig, RandomForest};
use crate::metrics::{
    accuracy_score, classification_report, f1_score, mean_std, precision_recall_f1, roc_auc,
    ClassReport, ConfusionMatrix,
};
use crate::smote::{self, DEFAULT_K_NEIGHBORS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub test_size: f64,
    pub seed: u64,
    pub k_neighbors: usize,
    pub cv_folds: usize,
    pub forest: ForestConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            k_neighbors: DEFAULT_K_NEIGHBORS,
            cv_folds: 5,
            forest: ForestConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassDistribution {
    pub train: BTreeMap<u8, usize>,
    pub test: BTreeMap<u8, usize>,
    /// Training partition after oversampling (equal to `train` when it was skipped).
    pub resampled: BTreeMap<u8, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
    pub cv_f1_scores: Vec<f64>,
    pub oob_score: Option<f64>,
    pub feature_importance: BTreeMap<String, f64>,
    pub class_distribution: ClassDistribution,
    pub class_weights: ClassWeights,
    pub resampled: bool,
    pub confusion_matrix: ConfusionMatrix,
    pub classification_report: Vec<ClassReport>,
}

impl TrainingMetrics {
    /// Features by descending importance.
    pub fn top_features(&self, n: usize) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .feature_importance
            .iter()
            .map(|(name, &v)| (name.as_str(), v))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(b.0)));
        ranked.truncate(n);
        ranked
    }
}

fn counts(labels: &[u8]) -> BTreeMap<u8, usize> {
    let mut out = BTreeMap::new();
    for &label in labels {
        *out.entry(label).or_insert(0) += 1;
    }
    out
}

fn class_indices(labels: &[u8]) -> BTreeMap<u8, Vec<usize>> {
    let mut out: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        out.entry(label).or_default().push(i);
    }
    out
}

/// Train/test row indices with each class split in the same proportion.
///
/// A class with a single row goes to the training side.
pub fn stratified_split(
    labels: &[u8],
    test_size: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), TrainError> {
    if labels.is_empty() {
        return Err(TrainError::EmptyDataset);
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for (_, mut indices) in class_indices(labels) {
        indices.shuffle(&mut rng);
        let n = indices.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_size).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    if train.is_empty() {
        return Err(TrainError::EmptyPartition { partition: "train" });
    }
    if test.is_empty() {
        return Err(TrainError::EmptyPartition { partition: "test" });
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok((train, test))
}

/// Held-out index sets for `k` stratified folds: each class is dealt round-robin.
pub fn stratified_folds(labels: &[u8], k: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); k];
    for (_, mut indices) in class_indices(labels) {
        indices.shuffle(&mut rng);
        for (i, index) in indices.into_iter().enumerate() {
            folds[i % k].push(index);
        }
    }
    folds
}

fn select<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| items[i].clone()).collect()
}

/// F1 of the stroke class on each of `k` stratified folds. Empty when there
/// are fewer rows than folds.
pub fn cross_val_f1(
    rows: &[Vec<f64>],
    labels: &[u8],
    class_weights: &ClassWeights,
    config: &TrainerConfig,
) -> Result<Vec<f64>, TrainError> {
    let k = config.cv_folds;
    if k < 2 || labels.len() < k {
        warn!(
            "skipping cross-validation: {} rows for {} folds",
            labels.len(),
            k
        );
        return Ok(Vec::new());
    }

    let mut scores = Vec::with_capacity(k);
    for held_out in stratified_folds(labels, k, config.seed) {
        let mut in_fold = vec![false; labels.len()];
        held_out.iter().for_each(|&i| in_fold[i] = true);
        let fit_idx: Vec<usize> = (0..labels.len()).filter(|&i| !in_fold[i]).collect();

        let model = RandomForest::fit_rows(
            &select(rows, &fit_idx),
            &select(labels, &fit_idx),
            class_weights,
            &config.forest,
        )?;
        let predicted: Vec<u8> = held_out.iter().map(|&i| model.predict_row(&rows[i])).collect();
        scores.push(f1_score(&select(labels, &held_out), &predicted));
    }
    Ok(scores)
}

/// Split, rebalance, cross-validate, fit, and score on the held-out rows.
///
/// `feature_names` labels the columns of `x` in the importance report.
pub fn train_stroke_model(
    x: &DenseMatrix<f64>,
    y: &[u8],
    feature_names: &[&str],
    config: &TrainerConfig,
) -> Result<(RandomForest, TrainingMetrics), TrainError> {
    let rows = to_rows(x);
    if rows.is_empty() {
        return Err(TrainError::EmptyDataset);
    }
    if rows.len() != y.len() {
        return Err(TrainError::LengthMismatch {
            rows: rows.len(),
            labels: y.len(),
        });
    }

    let (train_idx, test_idx) = stratified_split(y, config.test_size, config.seed)?;
    let train_rows = select(&rows, &train_idx);
    let train_labels = select(y, &train_idx);
    let test_rows = select(&rows, &test_idx);
    let test_labels = select(y, &test_idx);

    let class_weights = ClassWeights::balanced(&train_labels);
    info!(
        "class weights: no stroke {:.4}, stroke {:.4}",
        class_weights.no_stroke, class_weights.stroke
    );

    let (fit_rows, fit_labels, resampled) =
        match smote::fit_resample(&train_rows, &train_labels, config.k_neighbors, config.seed) {
            Ok((rows, labels)) => {
                info!(
                    "training data resampled - original: {} samples, after SMOTE: {} samples",
                    train_rows.len(),
                    rows.len()
                );
                (rows, labels, true)
            }
            Err(e) => {
                warn!("could not apply SMOTE: {}. Using original data.", e);
                (train_rows, train_labels.clone(), false)
            }
        };

    info!("training model with {}-fold cross-validation", config.cv_folds);
    let cv_f1_scores = cross_val_f1(&fit_rows, &fit_labels, &class_weights, config)?;

    info!("training final model on {} rows", fit_rows.len());
    let model = RandomForest::fit_rows(&fit_rows, &fit_labels, &class_weights, &config.forest)?;

    let proba: Vec<f64> = test_rows.iter().map(|r| model.predict_proba_row(r)).collect();
    let predicted: Vec<u8> = test_rows.iter().map(|r| model.predict_row(r)).collect();
    let (precision, recall, f1) = precision_recall_f1(&test_labels, &predicted);

    let feature_importance = feature_names
        .iter()
        .zip(model.feature_importances())
        .map(|(name, &v)| (name.to_string(), v))
        .collect();

    let metrics = TrainingMetrics {
        accuracy: accuracy_score(&test_labels, &predicted),
        precision,
        recall,
        f1_score: f1,
        roc_auc: roc_auc(&test_labels, &proba),
        cv_f1_scores,
        oob_score: model.oob_score(),
        feature_importance,
        class_distribution: ClassDistribution {
            train: counts(&train_labels),
            test: counts(&test_labels),
            resampled: counts(&fit_labels),
        },
        class_weights,
        resampled,
        confusion_matrix: ConfusionMatrix::from_predictions(&test_labels, &predicted),
        classification_report: classification_report(&test_labels, &predicted),
    };
    log_metrics(&metrics);

    Ok((model, metrics))
}

fn log_metrics(metrics: &TrainingMetrics) {
    let (cv_mean, cv_std) = mean_std(&metrics.cv_f1_scores);
    info!("=== Model Performance ===");
    info!(
        "Cross-validated F1 Score: {:.4} (+/- {:.4})",
        cv_mean,
        cv_std * 2.0
    );
    info!("Test Accuracy: {:.4}", metrics.accuracy);
    info!("Test Precision: {:.4}", metrics.precision);
    info!("Test Recall: {:.4}", metrics.recall);
    info!("Test F1 Score: {:.4}", metrics.f1_score);
    info!("ROC AUC: {:.4}", metrics.roc_auc);
    if let Some(oob) = metrics.oob_score {
        info!("OOB Score: {:.4}", oob);
    }
    for class in &metrics.classification_report {
        info!(
            "{:>10}  precision {:.2}  recall {:.2}  f1 {:.2}  support {}",
            class.label, class.precision, class.recall, class.f1_score, class.support
        );
    }
    info!("Top 5 Important Features:");
    for (feature, importance) in metrics.top_features(5) {
        info!("- {}: {:.4}", feature, importance);
    }
}
