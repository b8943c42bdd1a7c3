use serde::{Deserialize, Serialize};
use smartcore::metrics::{accuracy, roc_auc_score};
use statrs::statistics::Statistics;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut m = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t, p) {
                (1, 1) => m.true_positive += 1,
                (1, _) => m.false_negative += 1,
                (_, 1) => m.false_positive += 1,
                _ => m.true_negative += 1,
            }
        }
        m
    }
}

/// Zero when the denominator is zero.
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn harmonic(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Precision, recall and F1 with `positive` as the positive class.
fn class_scores(y_true: &[u8], y_pred: &[u8], positive: u8) -> (f64, f64, f64, usize) {
    let mut tp = 0;
    let mut predicted = 0;
    let mut support = 0;
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if p == positive {
            predicted += 1;
        }
        if t == positive {
            support += 1;
            if p == positive {
                tp += 1;
            }
        }
    }
    let precision = ratio(tp, predicted);
    let recall = ratio(tp, support);
    (precision, recall, harmonic(precision, recall), support)
}

pub fn precision_recall_f1(y_true: &[u8], y_pred: &[u8]) -> (f64, f64, f64) {
    let (p, r, f, _) = class_scores(y_true, y_pred, 1);
    (p, r, f)
}

pub fn f1_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    precision_recall_f1(y_true, y_pred).2
}

pub fn accuracy_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let t: Vec<i32> = y_true.iter().map(|&v| i32::from(v)).collect();
    let p: Vec<i32> = y_pred.iter().map(|&v| i32::from(v)).collect();
    accuracy(&t, &p)
}

/// Area under the ROC curve, or 0.5 when `y_true` holds a single class.
/// Tied scores share their average rank.
pub fn roc_auc(y_true: &[u8], proba: &[f64]) -> f64 {
    let positives = y_true.iter().filter(|&&v| v == 1).count();
    if positives == 0 || positives == y_true.len() {
        return 0.5;
    }
    // smartcore detects ties on the order it is given, so hand it the scores sorted.
    let mut pairs: Vec<(f64, u8)> = proba.iter().copied().zip(y_true.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let p: Vec<f64> = pairs.iter().map(|&(score, _)| score).collect();
    let t: Vec<f64> = pairs.iter().map(|&(_, label)| f64::from(label)).collect();
    roc_auc_score(&t, &p)
}

pub fn classification_report(y_true: &[u8], y_pred: &[u8]) -> Vec<ClassReport> {
    [(0u8, "No Stroke"), (1u8, "Stroke")]
        .iter()
        .map(|&(label, name)| {
            let (precision, recall, f1_score, support) = class_scores(y_true, y_pred, label);
            ClassReport {
                label: name.to_string(),
                precision,
                recall,
                f1_score,
                support,
            }
        })
        .collect()
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    (values.iter().mean(), values.iter().population_std_dev())
}
