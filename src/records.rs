use polars::prelude::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};

/// Sentinel written in place of a missing categorical value.
pub const UNKNOWN_CATEGORY: &str = "unknown";

pub const LABEL_COLUMN: &str = "stroke";

pub const NUTRITION_COLUMNS: [&str; 13] = [
    "calories",
    "protein_g",
    "fat_g",
    "carbs_g",
    "fiber_g",
    "sugar_g",
    "sodium_mg",
    "potassium_mg",
    "cholesterol_mg",
    "vitamin_a_iu",
    "vitamin_c_mg",
    "calcium_mg",
    "iron_mg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalColumn {
    Gender,
    SmokingStatus,
    ResidenceType,
    WorkType,
}

impl CategoricalColumn {
    pub const ALL: [CategoricalColumn; 4] = [
        CategoricalColumn::Gender,
        CategoricalColumn::SmokingStatus,
        CategoricalColumn::ResidenceType,
        CategoricalColumn::WorkType,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CategoricalColumn::Gender => "gender",
            CategoricalColumn::SmokingStatus => "smoking_status",
            CategoricalColumn::ResidenceType => "residence_type",
            CategoricalColumn::WorkType => "work_type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericColumn {
    Age,
    Bmi,
    AvgGlucoseLevel,
    Hypertension,
    HeartDisease,
}

impl NumericColumn {
    pub const ALL: [NumericColumn; 5] = [
        NumericColumn::Age,
        NumericColumn::Bmi,
        NumericColumn::AvgGlucoseLevel,
        NumericColumn::Hypertension,
        NumericColumn::HeartDisease,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NumericColumn::Age => "age",
            NumericColumn::Bmi => "bmi",
            NumericColumn::AvgGlucoseLevel => "avg_glucose_level",
            NumericColumn::Hypertension => "hypertension",
            NumericColumn::HeartDisease => "heart_disease",
        }
    }
}

/// One column of the classifier's input, in the order the model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Numeric(NumericColumn),
    Categorical(CategoricalColumn),
}

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Feature::Numeric(c) => c.name(),
            Feature::Categorical(c) => c.name(),
        }
    }
}

pub const FEATURES: [Feature; 9] = [
    Feature::Numeric(NumericColumn::Age),
    Feature::Categorical(CategoricalColumn::Gender),
    Feature::Numeric(NumericColumn::Bmi),
    Feature::Numeric(NumericColumn::Hypertension),
    Feature::Numeric(NumericColumn::HeartDisease),
    Feature::Numeric(NumericColumn::AvgGlucoseLevel),
    Feature::Categorical(CategoricalColumn::SmokingStatus),
    Feature::Categorical(CategoricalColumn::ResidenceType),
    Feature::Categorical(CategoricalColumn::WorkType),
];

pub fn feature_names() -> Vec<&'static str> {
    FEATURES.iter().map(|f| f.name()).collect()
}

/// Anything the classifier can score: a training row or a patient at inference.
pub trait FeatureSource {
    fn numeric(&self, column: NumericColumn) -> f64;
    fn category(&self, column: CategoricalColumn) -> &str;
}

/// A normalized patient row. Every field is populated once it leaves the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeRecord {
    pub gender: String,
    pub age: f64,
    pub hypertension: f64,
    pub heart_disease: f64,
    pub work_type: String,
    pub residence_type: String,
    pub avg_glucose_level: f64,
    pub bmi: f64,
    pub smoking_status: String,
    pub stroke: u8,
    pub nutrition: [f64; 13],
}

pub type Dataset = Vec<StrokeRecord>;

impl StrokeRecord {
    /// Every column is read as text; the normalizer owns type coercion so that
    /// values like "N/A" in a numeric column become missing instead of a read error.
    pub fn raw_schema() -> Schema {
        let mut fields = vec![
            Field::new("gender", DataType::Utf8),
            Field::new("age", DataType::Utf8),
            Field::new("hypertension", DataType::Utf8),
            Field::new("heart_disease", DataType::Utf8),
            Field::new("work_type", DataType::Utf8),
            Field::new("residence_type", DataType::Utf8),
            Field::new("avg_glucose_level", DataType::Utf8),
            Field::new("bmi", DataType::Utf8),
            Field::new("smoking_status", DataType::Utf8),
            Field::new(LABEL_COLUMN, DataType::Utf8),
        ];
        fields.extend(
            NUTRITION_COLUMNS
                .iter()
                .map(|name| Field::new(name, DataType::Utf8)),
        );
        Schema::from_iter(fields)
    }

    pub fn category_mut(&mut self, column: CategoricalColumn) -> &mut String {
        match column {
            CategoricalColumn::Gender => &mut self.gender,
            CategoricalColumn::SmokingStatus => &mut self.smoking_status,
            CategoricalColumn::ResidenceType => &mut self.residence_type,
            CategoricalColumn::WorkType => &mut self.work_type,
        }
    }

    pub fn numeric_mut(&mut self, column: NumericColumn) -> &mut f64 {
        match column {
            NumericColumn::Age => &mut self.age,
            NumericColumn::Bmi => &mut self.bmi,
            NumericColumn::AvgGlucoseLevel => &mut self.avg_glucose_level,
            NumericColumn::Hypertension => &mut self.hypertension,
            NumericColumn::HeartDisease => &mut self.heart_disease,
        }
    }
}

impl FeatureSource for StrokeRecord {
    fn numeric(&self, column: NumericColumn) -> f64 {
        match column {
            NumericColumn::Age => self.age,
            NumericColumn::Bmi => self.bmi,
            NumericColumn::AvgGlucoseLevel => self.avg_glucose_level,
            NumericColumn::Hypertension => self.hypertension,
            NumericColumn::HeartDisease => self.heart_disease,
        }
    }

    fn category(&self, column: CategoricalColumn) -> &str {
        match column {
            CategoricalColumn::Gender => &self.gender,
            CategoricalColumn::SmokingStatus => &self.smoking_status,
            CategoricalColumn::ResidenceType => &self.residence_type,
            CategoricalColumn::WorkType => &self.work_type,
        }
    }
}

/// Label counts as `(no_stroke, stroke)`.
pub fn label_counts(dataset: &[StrokeRecord]) -> (usize, usize) {
    let positives = dataset.iter().filter(|r| r.stroke == 1).count();
    (dataset.len() - positives, positives)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_schema_reads_everything_as_text() {
        let schema = StrokeRecord::raw_schema();
        assert_eq!(schema.len(), 10 + NUTRITION_COLUMNS.len());
        assert!(schema.iter_dtypes().all(|dtype| *dtype == DataType::Utf8));
    }

    #[test]
    fn feature_order_matches_training_layout() {
        assert_eq!(
            feature_names(),
            vec![
                "age",
                "gender",
                "bmi",
                "hypertension",
                "heart_disease",
                "avg_glucose_level",
                "smoking_status",
                "residence_type",
                "work_type",
            ]
        );
    }
}
