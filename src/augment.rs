//! Synthetic record generation.
//!
//! Draws extra rows from the empirical distribution of a base dataset and labels
//! them with a fixed additive risk heuristic. This deliberately skews the data
//! toward the heuristic; it exists to give the trainer more rows, not to mimic
//! the true incidence.

use log::info;
use rand::distributions::Distribution;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use statrs::statistics::Statistics;

use crate::encoder::EncoderRegistry;
use crate::records::{CategoricalColumn, Dataset, FeatureSource, StrokeRecord};

pub const AGE_RANGE: (f64, f64) = (18.0, 100.0);
pub const BMI_RANGE: (f64, f64) = (15.0, 50.0);
pub const GLUCOSE_RANGE: (f64, f64) = (50.0, 300.0);

const HYPERTENSION_PRIOR: f64 = 0.1;
const HEART_DISEASE_PRIOR: f64 = 0.05;
const MAX_LABEL_PROBABILITY: f64 = 0.9;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    pub samples: usize,
    pub seed: u64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            samples: 1000,
            seed: 42,
        }
    }
}

/// Normal draw from a column's mean and sample standard deviation. Falls back
/// to the mean when the deviation is undefined (one row) or zero.
struct ColumnSampler {
    mean: f64,
    normal: Option<Normal>,
}

impl ColumnSampler {
    fn fit(values: &[f64]) -> Self {
        let mean = values.iter().mean();
        let std_dev = values.iter().std_dev();
        let normal = if std_dev.is_finite() && std_dev > 0.0 {
            Normal::new(mean, std_dev).ok()
        } else {
            None
        };
        Self { mean, normal }
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match &self.normal {
            Some(normal) => normal.sample(rng),
            None => self.mean,
        }
    }
}

/// Additive stroke score used to label synthetic rows.
pub fn heuristic_risk(record: &StrokeRecord) -> f64 {
    let mut risk = 0.01;
    if record.age > 60.0 {
        risk += 0.02;
    }
    if record.bmi > 30.0 {
        risk += 0.01;
    }
    if record.hypertension == 1.0 {
        risk += 0.02;
    }
    if record.heart_disease == 1.0 {
        risk += 0.02;
    }
    if record.smoking_status.to_lowercase().contains("smokes") {
        risk += 0.01;
    }
    risk
}

/// Appends `config.samples` synthetic records to `base`.
///
/// The new rows' categories are admitted into `registry` in training mode, so
/// the registry covers the whole returned dataset. An empty base is returned as is.
pub fn generate_synthetic_data(
    mut base: Dataset,
    registry: &mut EncoderRegistry,
    config: &AugmentConfig,
) -> Dataset {
    if base.is_empty() {
        return base;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let options: Vec<(CategoricalColumn, Vec<String>)> = CategoricalColumn::ALL
        .iter()
        .map(|&column| {
            let mut distinct: Vec<String> = Vec::new();
            for record in &base {
                let value = record.category(column);
                if !distinct.iter().any(|d| d == value) {
                    distinct.push(value.to_string());
                }
            }
            (column, distinct)
        })
        .collect();

    let column = |f: fn(&StrokeRecord) -> f64| base.iter().map(f).collect::<Vec<_>>();
    let age = ColumnSampler::fit(&column(|r| r.age));
    let bmi = ColumnSampler::fit(&column(|r| r.bmi));
    let glucose = ColumnSampler::fit(&column(|r| r.avg_glucose_level));

    let mut synthetic = Vec::with_capacity(config.samples);
    for _ in 0..config.samples {
        let mut record = StrokeRecord {
            gender: String::new(),
            age: 0.0,
            hypertension: 0.0,
            heart_disease: 0.0,
            work_type: String::new(),
            residence_type: String::new(),
            avg_glucose_level: 0.0,
            bmi: 0.0,
            smoking_status: String::new(),
            stroke: 0,
            nutrition: [0.0; 13],
        };

        for (column, values) in &options {
            if let Some(value) = values.choose(&mut rng) {
                *record.category_mut(*column) = value.clone();
            }
        }

        record.age = num::clamp(age.sample(&mut rng).trunc(), AGE_RANGE.0, AGE_RANGE.1);
        record.bmi = num::clamp(bmi.sample(&mut rng), BMI_RANGE.0, BMI_RANGE.1);
        record.avg_glucose_level =
            num::clamp(glucose.sample(&mut rng), GLUCOSE_RANGE.0, GLUCOSE_RANGE.1);
        record.hypertension = if rng.gen_bool(HYPERTENSION_PRIOR) { 1.0 } else { 0.0 };
        record.heart_disease = if rng.gen_bool(HEART_DISEASE_PRIOR) { 1.0 } else { 0.0 };

        let p = heuristic_risk(&record).min(MAX_LABEL_PROBABILITY);
        record.stroke = u8::from(rng.gen::<f64>() < p);

        synthetic.push(record);
    }

    for column in CategoricalColumn::ALL {
        registry.fit_or_extend(column.name(), synthetic.iter().map(|r| r.category(column)));
    }

    let positives = synthetic.iter().filter(|r| r.stroke == 1).count();
    info!(
        "generated {} synthetic records ({} labelled stroke)",
        synthetic.len(),
        positives
    );

    base.extend(synthetic);
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::FitOutcome;

    fn record(age: f64, bmi: f64, smoking: &str, stroke: u8) -> StrokeRecord {
        StrokeRecord {
            gender: if stroke == 1 { "male" } else { "female" }.to_string(),
            age,
            hypertension: 0.0,
            heart_disease: 0.0,
            work_type: "Private".to_string(),
            residence_type: "Urban".to_string(),
            avg_glucose_level: 90.0 + age,
            bmi,
            smoking_status: smoking.to_string(),
            stroke,
            nutrition: [1.0; 13],
        }
    }

    fn base() -> Dataset {
        vec![
            record(25.0, 21.0, "never smoked", 0),
            record(47.0, 33.5, "smokes", 0),
            record(71.0, 28.0, "formerly smoked", 1),
            record(88.0, 45.0, "Unknown", 0),
        ]
    }

    fn fitted_registry(data: &Dataset) -> EncoderRegistry {
        let mut registry = EncoderRegistry::new();
        for column in CategoricalColumn::ALL {
            registry.fit_or_extend(column.name(), data.iter().map(|r| r.category(column)));
        }
        registry
    }

    #[test]
    fn appends_exactly_the_requested_rows() {
        let data = base();
        let mut registry = fitted_registry(&data);
        let config = AugmentConfig { samples: 250, seed: 7 };

        let augmented = generate_synthetic_data(data.clone(), &mut registry, &config);

        assert_eq!(augmented.len(), data.len() + 250);
        assert_eq!(&augmented[..data.len()], &data[..]);
    }

    #[test]
    fn synthetic_numerics_stay_in_range() {
        let data = base();
        let mut registry = fitted_registry(&data);
        let config = AugmentConfig { samples: 2000, seed: 11 };

        let augmented = generate_synthetic_data(data.clone(), &mut registry, &config);

        for r in &augmented[data.len()..] {
            assert!(r.age >= AGE_RANGE.0 && r.age <= AGE_RANGE.1, "age {}", r.age);
            assert_eq!(r.age, r.age.trunc());
            assert!(r.bmi >= BMI_RANGE.0 && r.bmi <= BMI_RANGE.1, "bmi {}", r.bmi);
            assert!(
                r.avg_glucose_level >= GLUCOSE_RANGE.0 && r.avg_glucose_level <= GLUCOSE_RANGE.1,
                "glucose {}",
                r.avg_glucose_level
            );
            assert!(r.hypertension == 0.0 || r.hypertension == 1.0);
            assert!(r.heart_disease == 0.0 || r.heart_disease == 1.0);
            assert!(r.stroke <= 1);
            assert_eq!(r.nutrition, [0.0; 13]);
        }
    }

    #[test]
    fn categories_come_from_the_base_vocabulary() {
        let data = base();
        let mut registry = fitted_registry(&data);
        let before = registry.clone();

        let augmented =
            generate_synthetic_data(data, &mut registry, &AugmentConfig { samples: 300, seed: 3 });

        assert_eq!(registry, before);
        for r in &augmented {
            for column in CategoricalColumn::ALL {
                assert!(registry.apply(column.name(), r.category(column)).is_ok());
            }
        }
        // the registry was not rebuilt, so a re-fit over everything is a no-op
        let outcome = registry.fit_or_extend(
            "smoking_status",
            augmented.iter().map(|r| r.smoking_status.as_str()),
        );
        assert_eq!(outcome, FitOutcome::Unchanged);
    }

    #[test]
    fn same_seed_same_rows() {
        let data = base();
        let config = AugmentConfig { samples: 100, seed: 99 };

        let a = generate_synthetic_data(data.clone(), &mut fitted_registry(&data), &config);
        let b = generate_synthetic_data(data.clone(), &mut fitted_registry(&data), &config);

        assert_eq!(a, b);
    }

    #[test]
    fn single_row_base_samples_the_mean() {
        let data = vec![record(70.0, 31.0, "smokes", 1)];
        let mut registry = fitted_registry(&data);

        let augmented =
            generate_synthetic_data(data, &mut registry, &AugmentConfig { samples: 20, seed: 1 });

        assert_eq!(augmented.len(), 21);
        assert!(augmented.iter().all(|r| r.age == 70.0 && r.bmi == 31.0));
    }

    #[test]
    fn empty_base_is_untouched() {
        let mut registry = EncoderRegistry::new();
        let out = generate_synthetic_data(Vec::new(), &mut registry, &AugmentConfig::default());
        assert!(out.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn heuristic_adds_up() {
        let mut r = record(65.0, 32.0, "Smokes", 0);
        r.hypertension = 1.0;
        r.heart_disease = 1.0;
        assert!((heuristic_risk(&r) - 0.09).abs() < 1e-12);

        let quiet = record(30.0, 22.0, "never smoked", 0);
        assert!((heuristic_risk(&quiet) - 0.01).abs() < 1e-12);
    }
}
