use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::encoder::EncoderRegistry;
use crate::error::PersistenceError;
use crate::forest::RandomForest;
use crate::scaler::NutritionScaler;

pub const BUNDLE_FILE: &str = "model_bundle.json";
const FORMAT_VERSION: u32 = 1;

/// Everything inference needs, loaded and saved as one unit. Immutable once
/// built; share it by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBundle {
    classifier: RandomForest,
    scaler: NutritionScaler,
    encoders: EncoderRegistry,
}

impl ModelBundle {
    pub fn new(classifier: RandomForest, scaler: NutritionScaler, encoders: EncoderRegistry) -> Self {
        Self {
            classifier,
            scaler,
            encoders,
        }
    }

    pub fn classifier(&self) -> &RandomForest {
        &self.classifier
    }

    pub fn scaler(&self) -> &NutritionScaler {
        &self.scaler
    }

    pub fn encoders(&self) -> &EncoderRegistry {
        &self.encoders
    }
}

#[derive(Serialize)]
struct BundleRef<'a> {
    format_version: u32,
    classifier: &'a RandomForest,
    scaler: &'a NutritionScaler,
    encoders: &'a EncoderRegistry,
}

#[derive(Deserialize)]
struct BundleFile {
    #[serde(default)]
    format_version: u32,
    classifier: Option<RandomForest>,
    scaler: Option<NutritionScaler>,
    encoders: Option<EncoderRegistry>,
}

/// All-or-nothing persistence of a [`ModelBundle`] at a location.
pub trait BundleStore {
    fn save(&self, bundle: &ModelBundle, location: &Path) -> Result<(), PersistenceError>;
    fn load(&self, location: &Path) -> Result<ModelBundle, PersistenceError>;
    fn exists(&self, location: &Path) -> bool;
}

/// Stores the bundle as `model_bundle.json` inside the location directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBundleStore;

impl JsonBundleStore {
    pub fn bundle_path(location: &Path) -> PathBuf {
        location.join(BUNDLE_FILE)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl BundleStore for JsonBundleStore {
    /// Writes to a temp file next to the target and renames it over the old
    /// bundle, so readers see either the previous bundle or the new one.
    fn save(&self, bundle: &ModelBundle, location: &Path) -> Result<(), PersistenceError> {
        let path = Self::bundle_path(location);
        fs::create_dir_all(location).map_err(io_error(location))?;

        let mut tmp = NamedTempFile::new_in(location).map_err(io_error(location))?;
        let tmp_path = tmp.path().to_path_buf();
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(
                &mut writer,
                &BundleRef {
                    format_version: FORMAT_VERSION,
                    classifier: &bundle.classifier,
                    scaler: &bundle.scaler,
                    encoders: &bundle.encoders,
                },
            )
            .map_err(PersistenceError::Encode)?;
            writer.flush().map_err(io_error(&tmp_path))?;
        }
        tmp.as_file().sync_all().map_err(io_error(&tmp_path))?;
        tmp.persist(&path)
            .map_err(|e| PersistenceError::Io {
                path: path.clone(),
                source: e.error,
            })?;

        info!("saved model bundle to {:?}", path);
        Ok(())
    }

    fn load(&self, location: &Path) -> Result<ModelBundle, PersistenceError> {
        let path = Self::bundle_path(location);
        if !path.is_file() {
            return Err(PersistenceError::Missing { path });
        }

        let json = fs::read_to_string(&path).map_err(io_error(&path))?;
        let file: BundleFile =
            serde_json::from_str(&json).map_err(|source| PersistenceError::Corrupt {
                path: path.clone(),
                source,
            })?;
        debug!("bundle format version {}", file.format_version);

        let missing = |artifact| PersistenceError::MissingArtifact {
            path: path.clone(),
            artifact,
        };
        let bundle = ModelBundle {
            classifier: file.classifier.ok_or_else(|| missing("classifier"))?,
            scaler: file.scaler.ok_or_else(|| missing("scaler"))?,
            encoders: file.encoders.ok_or_else(|| missing("encoders"))?,
        };
        info!(
            "loaded model bundle from {:?} ({} trees)",
            path,
            bundle.classifier.n_trees()
        );
        Ok(bundle)
    }

    fn exists(&self, location: &Path) -> bool {
        Self::bundle_path(location).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::{ClassWeights, ForestConfig};
    use tempfile::tempdir;

    fn bundle() -> ModelBundle {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let labels: Vec<u8> = (0..20).map(|i| u8::from(i >= 10)).collect();
        let config = ForestConfig {
            n_trees: 3,
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit_rows(&rows, &labels, &ClassWeights::uniform(), &config).unwrap();
        let mut encoders = EncoderRegistry::new();
        encoders.fit_or_extend("gender", ["male", "female"]);
        ModelBundle::new(forest, NutritionScaler::fit_dataset(&[]).unwrap(), encoders)
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let store = JsonBundleStore;
        assert!(!store.exists(dir.path()));

        let original = bundle();
        store.save(&original, dir.path()).unwrap();

        assert!(store.exists(dir.path()));
        assert_eq!(store.load(dir.path()).unwrap(), original);
        // only the bundle itself is left behind
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn save_creates_the_directory_and_replaces() {
        let dir = tempdir().unwrap();
        let location = dir.path().join("models");
        let store = JsonBundleStore;

        store.save(&bundle(), &location).unwrap();
        store.save(&bundle(), &location).unwrap();

        assert!(store.load(&location).is_ok());
    }

    #[test]
    fn missing_bundle() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            JsonBundleStore.load(dir.path()),
            Err(PersistenceError::Missing { .. })
        ));
    }

    #[test]
    fn partial_bundle_is_rejected() {
        let dir = tempdir().unwrap();
        let full = bundle();
        let partial = serde_json::json!({
            "format_version": 1,
            "classifier": full.classifier(),
            "encoders": full.encoders(),
        });
        fs::write(JsonBundleStore::bundle_path(dir.path()), partial.to_string()).unwrap();

        match JsonBundleStore.load(dir.path()) {
            Err(PersistenceError::MissingArtifact { artifact, .. }) => assert_eq!(artifact, "scaler"),
            other => panic!("expected MissingArtifact, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn truncated_bundle_is_corrupt() {
        let dir = tempdir().unwrap();
        fs::write(JsonBundleStore::bundle_path(dir.path()), "{\"classifier\": {").unwrap();
        assert!(matches!(
            JsonBundleStore.load(dir.path()),
            Err(PersistenceError::Corrupt { .. })
        ));
    }
}
