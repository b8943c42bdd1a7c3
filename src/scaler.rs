use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::records::{StrokeRecord, NUTRITION_COLUMNS};

/// Standardisation (`(x - mean) / scale`) over the nutrition columns.
///
/// Fitted and persisted with every bundle. Nothing in the recommendation rules
/// reads it yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionScaler {
    columns: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
}

pub fn nutrition_frame(dataset: &[StrokeRecord]) -> PolarsResult<DataFrame> {
    let columns = NUTRITION_COLUMNS
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let values: Vec<f64> = dataset.iter().map(|r| r.nutrition[j]).collect();
            Series::new(name, values)
        })
        .collect::<Vec<Series>>();
    DataFrame::new(columns)
}

impl NutritionScaler {
    /// Fits on a frame holding the nutrition columns as `f64`. Population
    /// standard deviation; a constant column gets scale 1.
    pub fn fit(df: &DataFrame) -> Result<Self, DataError> {
        let mut means = Vec::with_capacity(NUTRITION_COLUMNS.len());
        let mut scales = Vec::with_capacity(NUTRITION_COLUMNS.len());
        for name in NUTRITION_COLUMNS {
            let values = df.column(name)?.f64()?;
            let mean = values.mean().unwrap_or(0.0);
            let std = values.std(0).unwrap_or(0.0);
            means.push(mean);
            scales.push(if std > 0.0 { std } else { 1.0 });
        }
        Ok(Self {
            columns: NUTRITION_COLUMNS.iter().map(|c| c.to_string()).collect(),
            means,
            scales,
        })
    }

    pub fn fit_dataset(dataset: &[StrokeRecord]) -> Result<Self, DataError> {
        Self::fit(&nutrition_frame(dataset)?)
    }

    pub fn transform(&self, values: &[f64; 13]) -> [f64; 13] {
        let mut out = [0.0; 13];
        for (j, slot) in out.iter_mut().enumerate() {
            *slot = (values[j] - self.means[j]) / self.scales[j];
        }
        out
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn with_nutrition(calories: f64, sodium: f64) -> StrokeRecord {
        let mut nutrition = [0.0; 13];
        nutrition[0] = calories;
        nutrition[6] = sodium;
        StrokeRecord {
            gender: "female".to_string(),
            age: 50.0,
            hypertension: 0.0,
            heart_disease: 0.0,
            work_type: "Private".to_string(),
            residence_type: "Urban".to_string(),
            avg_glucose_level: 100.0,
            bmi: 25.0,
            smoking_status: "never smoked".to_string(),
            stroke: 0,
            nutrition,
        }
    }

    #[test]
    fn fits_mean_and_population_std() {
        let data = vec![with_nutrition(1800.0, 2000.0), with_nutrition(2200.0, 2000.0)];
        let scaler = NutritionScaler::fit_dataset(&data).unwrap();

        assert_eq!(scaler.columns().len(), 13);
        assert_abs_diff_eq!(scaler.means()[0], 2000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(scaler.scales()[0], 200.0, epsilon = 1e-9);
        // constant column
        assert_eq!(scaler.scales()[6], 1.0);

        let z = scaler.transform(&data[1].nutrition);
        assert_abs_diff_eq!(z[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(z[6], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_dataset_gives_identity() {
        let scaler = NutritionScaler::fit_dataset(&[]).unwrap();
        assert!(scaler.means().iter().all(|&m| m == 0.0));
        assert!(scaler.scales().iter().all(|&s| s == 1.0));
    }
}
