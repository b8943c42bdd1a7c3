//! Scoring a single patient and turning the score into dietary guidance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UnknownCategoryError;
use crate::features::encode_row;
use crate::records::{CategoricalColumn, FeatureSource, NumericColumn};
use crate::store::ModelBundle;

const WEIGHT_MANAGEMENT: [&str; 2] = [
    "Reduce daily caloric intake by 500-1000 kcal for weight loss.",
    "Focus on whole, unprocessed foods.",
];

const HIGH_RISK: [&str; 3] = [
    "Follow a DASH (Dietary Approaches to Stop Hypertension) diet.",
    "Limit sodium intake to less than 1,500 mg per day.",
    "Increase potassium-rich foods like bananas, spinach, and sweet potatoes.",
];

const GENERAL: [&str; 4] = [
    "Consume at least 5 servings of fruits and vegetables daily.",
    "Choose whole grains over refined grains.",
    "Include fatty fish (like salmon) twice a week for omega-3 fatty acids.",
    "Stay hydrated with water and limit sugary beverages.",
];

fn default_residence_type() -> String {
    "Urban".to_string()
}

fn default_work_type() -> String {
    "Private".to_string()
}

/// A patient as submitted for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientInput {
    pub age: f64,
    pub gender: String,
    pub bmi: f64,
    #[serde(default)]
    pub hypertension: u8,
    #[serde(default)]
    pub heart_disease: u8,
    pub avg_glucose_level: f64,
    pub smoking_status: String,
    #[serde(default = "default_residence_type")]
    pub residence_type: String,
    #[serde(default = "default_work_type")]
    pub work_type: String,
}

impl FeatureSource for PatientInput {
    fn numeric(&self, column: NumericColumn) -> f64 {
        match column {
            NumericColumn::Age => self.age,
            NumericColumn::Bmi => self.bmi,
            NumericColumn::AvgGlucoseLevel => self.avg_glucose_level,
            NumericColumn::Hypertension => f64::from(self.hypertension),
            NumericColumn::HeartDisease => f64::from(self.heart_disease),
        }
    }

    fn category(&self, column: CategoricalColumn) -> &str {
        match column {
            CategoricalColumn::Gender => self.gender.trim(),
            CategoricalColumn::SmokingStatus => self.smoking_status.trim(),
            CategoricalColumn::ResidenceType => self.residence_type.trim(),
            CategoricalColumn::WorkType => self.work_type.trim(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
}

impl RiskCategory {
    pub fn from_probability(probability: f64) -> Self {
        if probability < 0.2 {
            RiskCategory::Low
        } else if probability < 0.5 {
            RiskCategory::Moderate
        } else {
            RiskCategory::High
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskCategory::Low => "Low",
            RiskCategory::Moderate => "Moderate",
            RiskCategory::High => "High",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub stroke_risk: f64,
    pub risk_category: RiskCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyGoals {
    pub calories: u32,
    pub protein_g: u32,
    pub fiber_g: u32,
    pub sodium_mg: u32,
    pub sugar_g: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calcium_mg: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitamin_d_iu: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionPlan {
    pub recommendations: Vec<String>,
    pub daily_goals: DailyGoals,
}

/// The full answer for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub stroke_risk: f64,
    pub risk_category: RiskCategory,
    pub recommendations: Vec<String>,
    pub nutrition_goals: DailyGoals,
}

/// P(stroke) for one patient. Categories are looked up strictly: a value the
/// encoders never saw fails the call instead of being guessed.
pub fn predict_stroke_risk(
    bundle: &ModelBundle,
    patient: &PatientInput,
) -> Result<RiskAssessment, UnknownCategoryError> {
    let row = encode_row(patient, bundle.encoders())?;
    let stroke_risk = bundle.classifier().predict_proba_row(&row);
    Ok(RiskAssessment {
        stroke_risk,
        risk_category: RiskCategory::from_probability(stroke_risk),
    })
}

pub fn daily_nutrition_goals(patient: &PatientInput) -> DailyGoals {
    let male = patient.gender.trim() == "male";
    let mut goals = DailyGoals {
        calories: if male { 2000 } else { 1800 },
        protein_g: if male { 56 } else { 46 },
        fiber_g: 30,
        sodium_mg: if patient.hypertension != 0 { 1500 } else { 2300 },
        sugar_g: 25,
        calcium_mg: None,
        vitamin_d_iu: None,
    };

    if patient.age > 50.0 {
        goals.calories = goals.calories.saturating_sub(200).max(1600);
        goals.calcium_mg = Some(1200);
        goals.vitamin_d_iu = Some(800);
    }
    goals
}

/// Rule-based guidance from body metrics and a risk score; no model involved.
pub fn get_nutrition_recommendations(patient: &PatientInput, stroke_risk: f64) -> NutritionPlan {
    let mut recommendations = Vec::new();
    if patient.bmi >= 30.0 {
        recommendations.extend(WEIGHT_MANAGEMENT.iter().map(|s| s.to_string()));
    }
    if stroke_risk > 0.7 {
        recommendations.extend(HIGH_RISK.iter().map(|s| s.to_string()));
    }
    recommendations.extend(GENERAL.iter().map(|s| s.to_string()));

    NutritionPlan {
        recommendations,
        daily_goals: daily_nutrition_goals(patient),
    }
}

pub fn analyze(bundle: &ModelBundle, patient: &PatientInput) -> Result<Analysis, UnknownCategoryError> {
    let risk = predict_stroke_risk(bundle, patient)?;
    let plan = get_nutrition_recommendations(patient, risk.stroke_risk);
    Ok(Analysis {
        stroke_risk: risk.stroke_risk,
        risk_category: risk.risk_category,
        recommendations: plan.recommendations,
        nutrition_goals: plan.daily_goals,
    })
}
