use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::encoder::EncoderRegistry;
use crate::error::UnknownCategoryError;
use crate::records::{Feature, FeatureSource, StrokeRecord, FEATURES};

/// Strictly encodes one source into the classifier's feature layout.
pub fn encode_row<S>(source: &S, encoders: &EncoderRegistry) -> Result<Vec<f64>, UnknownCategoryError>
where
    S: FeatureSource + ?Sized,
{
    FEATURES
        .iter()
        .map(|feature| match *feature {
            Feature::Numeric(column) => Ok(finite_or_zero(source.numeric(column))),
            Feature::Categorical(column) => encoders
                .apply(column.name(), source.category(column))
                .map(|index| index as f64),
        })
        .collect()
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Row-major feature matrix plus label vector for a whole dataset.
///
/// Encoding is strict: call this only after every category in `dataset` has
/// been admitted to `encoders`, so no row is encoded against a stale vocabulary.
pub fn feature_matrix(
    dataset: &[StrokeRecord],
    encoders: &EncoderRegistry,
) -> Result<(DenseMatrix<f64>, Vec<u8>), UnknownCategoryError> {
    let mut values = Vec::with_capacity(dataset.len() * FEATURES.len());
    for record in dataset {
        values.extend(encode_row(record, encoders)?);
    }
    let labels = dataset.iter().map(|r| r.stroke).collect();

    Ok((
        DenseMatrix::new(dataset.len(), FEATURES.len(), values, false),
        labels,
    ))
}

pub fn to_rows(x: &DenseMatrix<f64>) -> Vec<Vec<f64>> {
    let (nrows, ncols) = x.shape();
    (0..nrows)
        .map(|i| (0..ncols).map(|j| *x.get((i, j))).collect())
        .collect()
}

pub fn from_rows(rows: &[Vec<f64>], ncols: usize) -> DenseMatrix<f64> {
    let values: Vec<f64> = rows.iter().flat_map(|row| row.iter().copied()).collect();
    DenseMatrix::new(rows.len(), ncols, values, false)
}
