use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Raw input that cannot be repaired by imputation.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("cannot open data source {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("row {row}: invalid stroke label {value:?}")]
    InvalidLabel { row: usize, value: Option<String> },
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// A categorical value outside the fitted vocabulary, seen in strict (inference) mode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown category {value:?} for column {column:?}")]
pub struct UnknownCategoryError {
    pub column: String,
    pub value: String,
}

/// SMOTE cannot run on the training partition. Recovered by the trainer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResamplingError {
    #[error("training partition holds a single class, nothing to oversample")]
    SingleClass,
    #[error("need at least 2 minority samples to interpolate, found {found}")]
    TooFewMinority { found: usize },
    #[error("nearest-neighbour search failed: {0}")]
    NeighborSearch(String),
}

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("cannot train on an empty dataset")]
    EmptyDataset,
    #[error("feature matrix has {rows} rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("stratified split left the {partition} partition empty")]
    EmptyPartition { partition: &'static str },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("no model bundle at {path:?}")]
    Missing { path: PathBuf },
    #[error("model bundle at {path:?} has no {artifact}")]
    MissingArtifact { path: PathBuf, artifact: &'static str },
    #[error("model bundle at {path:?} is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot serialize model bundle: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A training config file that cannot be used.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything `pipeline::train` can fail with.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Encoding(#[from] UnknownCategoryError),
}
