use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::augment::{generate_synthetic_data, AugmentConfig};
use crate::encoder::{EncoderRegistry, FitOutcome};
use crate::error::{ConfigError, PersistenceError, PipelineError};
use crate::features::feature_matrix;
use crate::loader::load_dataset;
use crate::records::{feature_names, label_counts, CategoricalColumn, FeatureSource, StrokeRecord};
use crate::scaler::NutritionScaler;
use crate::store::{BundleStore, ModelBundle};
use crate::trainer::{train_stroke_model, TrainerConfig, TrainingMetrics};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data_path: PathBuf,
    pub model_dir: PathBuf,
    pub use_synthetic_data: bool,
    pub augment: AugmentConfig,
    pub trainer: TrainerConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/stroke_data.csv"),
            model_dir: PathBuf::from("models"),
            use_synthetic_data: true,
            augment: AugmentConfig::default(),
            trainer: TrainerConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Reads a JSON config; fields it leaves out keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Grows `registry` to cover every category in `dataset`.
pub fn fit_encoders(registry: &mut EncoderRegistry, dataset: &[StrokeRecord]) {
    for column in CategoricalColumn::ALL {
        let values = dataset.iter().map(|r| r.category(column));
        if registry.fit_or_extend(column.name(), values) == FitOutcome::Rebuilt {
            warn!("encoder for {} was rebuilt", column.name());
        }
    }
}

/// Load, augment, fit, evaluate and persist. The bundle is written only after
/// every stage succeeded.
pub async fn train<S: BundleStore>(
    config: &TrainConfig,
    store: &S,
) -> Result<(ModelBundle, TrainingMetrics), PipelineError> {
    info!("loading training data from {:?}", config.data_path);
    let base = load_dataset(&config.data_path).await?;

    let mut encoders = EncoderRegistry::new();
    fit_encoders(&mut encoders, &base);

    let dataset = if config.use_synthetic_data {
        info!("generating {} synthetic records", config.augment.samples);
        generate_synthetic_data(base, &mut encoders, &config.augment)
    } else {
        base
    };
    let (negatives, positives) = label_counts(&dataset);
    info!(
        "training set: {} records ({} stroke, {} no stroke)",
        dataset.len(),
        positives,
        negatives
    );

    // Every vocabulary change happened above; encode once, strictly.
    let (x, y) = feature_matrix(&dataset, &encoders)?;
    let (classifier, metrics) = train_stroke_model(&x, &y, &feature_names(), &config.trainer)?;

    let scaler = NutritionScaler::fit_dataset(&dataset)?;
    let bundle = ModelBundle::new(classifier, scaler, encoders);
    store.save(&bundle, &config.model_dir)?;

    Ok((bundle, metrics))
}

/// The stored bundle if there is one, otherwise a freshly trained one.
pub async fn load_or_train<S: BundleStore>(
    config: &TrainConfig,
    store: &S,
) -> Result<ModelBundle, PipelineError> {
    if store.exists(&config.model_dir) {
        return Ok(store.load(&config.model_dir)?);
    }
    info!("no model found in {:?}, training a new one", config.model_dir);
    let (bundle, _) = train(config, store).await?;
    Ok(bundle)
}

pub fn write_metrics<P: AsRef<Path>>(metrics: &TrainingMetrics, path: P) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(metrics).map_err(PersistenceError::Encode)?;
    fs::write(path, json).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("wrote training metrics to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train.json");
        fs::write(
            &path,
            r#"{"data_path": "other.csv", "augment": {"samples": 10}, "trainer": {"forest": {"n_trees": 7}}}"#,
        )
        .unwrap();

        let config = TrainConfig::from_json_file(&path).unwrap();
        assert_eq!(config.data_path, PathBuf::from("other.csv"));
        assert_eq!(config.model_dir, PathBuf::from("models"));
        assert!(config.use_synthetic_data);
        assert_eq!(config.augment.samples, 10);
        assert_eq!(config.augment.seed, 42);
        assert_eq!(config.trainer.forest.n_trees, 7);
        assert_eq!(config.trainer.forest.max_depth, Some(8));
        assert_eq!(config.trainer.test_size, 0.2);
    }

    #[test]
    fn bad_config_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            TrainConfig::from_json_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            TrainConfig::from_json_file(dir.path().join("absent.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn encoders_cover_the_dataset() {
        let record = StrokeRecord {
            gender: "female".to_string(),
            age: 61.0,
            hypertension: 0.0,
            heart_disease: 1.0,
            work_type: "Self-employed".to_string(),
            residence_type: "Rural".to_string(),
            avg_glucose_level: 202.21,
            bmi: 28.1,
            smoking_status: "never smoked".to_string(),
            stroke: 1,
            nutrition: [0.0; 13],
        };
        let mut registry = EncoderRegistry::new();
        fit_encoders(&mut registry, &[record.clone()]);

        for column in CategoricalColumn::ALL {
            assert_eq!(registry.apply(column.name(), record.category(column)), Ok(0));
        }
    }
}
