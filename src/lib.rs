//! Stroke risk prediction and nutrition guidance.
//!
//! Training: CSV → [`loader`]/[`normalize`] → [`encoder`] → [`augment`] →
//! [`trainer`] → [`store`]. Inference: [`inference::analyze`] against a loaded
//! [`store::ModelBundle`].

pub mod augment;
pub mod encoder;
pub mod error;
pub mod features;
pub mod forest;
pub mod inference;
pub mod loader;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod records;
pub mod scaler;
pub mod smote;
pub mod store;
pub mod trainer;

pub use error::{
    ConfigError, DataError, PersistenceError, PipelineError, ResamplingError, TrainError,
    UnknownCategoryError,
};
pub use inference::{analyze, Analysis, PatientInput, RiskCategory};
pub use pipeline::{train, TrainConfig};
pub use records::{Dataset, StrokeRecord};
pub use store::{BundleStore, JsonBundleStore, ModelBundle};
