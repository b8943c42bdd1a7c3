use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::UnknownCategoryError;

/// Injective map from category label to a small index.
///
/// Indices are assigned in first-seen order when the encoder is created and in
/// lexicographic order of the full vocabulary whenever it is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelEncoder {
    fn from_classes(classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, class)| (class.clone(), i))
            .collect();
        Self { classes, index }
    }

    /// Builds an encoder over the distinct values in order of first appearance.
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut classes: Vec<String> = Vec::new();
        let mut seen = BTreeSet::new();
        for value in values {
            if seen.insert(value) {
                classes.push(value.to_string());
            }
        }
        Self::from_classes(classes)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.index.contains_key(value)
    }

    pub fn transform(&self, value: &str) -> Option<usize> {
        self.index.get(value).copied()
    }

    pub fn inverse_transform(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

impl From<Vec<String>> for LabelEncoder {
    fn from(classes: Vec<String>) -> Self {
        Self::from_classes(classes)
    }
}

impl From<LabelEncoder> for Vec<String> {
    fn from(encoder: LabelEncoder) -> Self {
        encoder.classes
    }
}

/// What `fit_or_extend` did to a column's encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    Created,
    Unchanged,
    /// Indices were reassigned; anything encoded before this call is stale.
    Rebuilt,
}

/// Column name to encoder. Growing the vocabulary needs `&mut self`; inference
/// only ever holds `&EncoderRegistry` and therefore can only call [`apply`].
///
/// [`apply`]: EncoderRegistry::apply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderRegistry {
    encoders: BTreeMap<String, LabelEncoder>,
}

impl EncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit_or_extend<'a, I>(&mut self, column: &str, values: I) -> FitOutcome
    where
        I: IntoIterator<Item = &'a str>,
    {
        let Some(existing) = self.encoders.get(column) else {
            let encoder = LabelEncoder::fit(values);
            debug!("{}: new encoder with {} classes", column, encoder.len());
            self.encoders.insert(column.to_string(), encoder);
            return FitOutcome::Created;
        };

        let unseen: BTreeSet<&str> = values
            .into_iter()
            .filter(|value| !existing.contains(value))
            .collect();
        if unseen.is_empty() {
            return FitOutcome::Unchanged;
        }

        let union: BTreeSet<&str> = existing
            .classes()
            .iter()
            .map(String::as_str)
            .chain(unseen.iter().copied())
            .collect();
        warn!(
            "{}: rebuilding encoder for {} unseen value(s) {:?}; earlier encodings are stale",
            column,
            unseen.len(),
            unseen
        );
        let rebuilt = LabelEncoder::from_classes(union.into_iter().map(str::to_string).collect());
        self.encoders.insert(column.to_string(), rebuilt);
        FitOutcome::Rebuilt
    }

    /// Training-time encoding: grows the vocabulary if needed, then looks up.
    pub fn encode(&mut self, column: &str, value: &str) -> usize {
        self.fit_or_extend(column, std::iter::once(value));
        // fit_or_extend just admitted `value`
        self.encoders[column].index[value]
    }

    /// Strict lookup. Never changes the vocabulary.
    pub fn apply(&self, column: &str, value: &str) -> Result<usize, UnknownCategoryError> {
        self.encoders
            .get(column)
            .and_then(|encoder| encoder.transform(value))
            .ok_or_else(|| UnknownCategoryError {
                column: column.to_string(),
                value: value.to_string(),
            })
    }

    pub fn get(&self, column: &str) -> Option<&LabelEncoder> {
        self.encoders.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.encoders.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_keeps_first_seen_order() {
        let mut registry = EncoderRegistry::new();
        let outcome = registry.fit_or_extend("gender", ["male", "female", "male", "Other"]);

        assert_eq!(outcome, FitOutcome::Created);
        assert_eq!(registry.apply("gender", "male"), Ok(0));
        assert_eq!(registry.apply("gender", "female"), Ok(1));
        assert_eq!(registry.apply("gender", "Other"), Ok(2));
    }

    #[test]
    fn known_values_never_rebuild() {
        let mut registry = EncoderRegistry::new();
        registry.fit_or_extend("work_type", ["Private", "Govt_job"]);
        let before = registry.apply("work_type", "Govt_job").unwrap();

        let outcome = registry.fit_or_extend("work_type", ["Govt_job", "Private", "Private"]);

        assert_eq!(outcome, FitOutcome::Unchanged);
        assert_eq!(registry.apply("work_type", "Govt_job").unwrap(), before);
    }

    #[test]
    fn unseen_value_rebuilds_in_sorted_order() {
        let mut registry = EncoderRegistry::new();
        registry.fit_or_extend("smoking_status", ["smokes", "never smoked"]);
        assert_eq!(registry.apply("smoking_status", "smokes"), Ok(0));

        let outcome = registry.fit_or_extend("smoking_status", ["formerly smoked", "smokes"]);

        assert_eq!(outcome, FitOutcome::Rebuilt);
        let classes = registry.get("smoking_status").unwrap().classes();
        assert_eq!(classes, ["formerly smoked", "never smoked", "smokes"]);
        assert_eq!(registry.apply("smoking_status", "smokes"), Ok(2));
    }

    #[test]
    fn apply_is_strict() {
        let mut registry = EncoderRegistry::new();
        registry.fit_or_extend("residence_type", ["Urban", "Rural"]);

        let err = registry.apply("residence_type", "Suburban").unwrap_err();
        assert_eq!(err.column, "residence_type");
        assert_eq!(err.value, "Suburban");
        assert!(registry.apply("gender", "male").is_err());
        assert_eq!(registry.get("residence_type").unwrap().len(), 2);
    }

    #[test]
    fn encode_grows_vocabulary() {
        let mut registry = EncoderRegistry::new();
        assert_eq!(registry.encode("gender", "male"), 0);
        assert_eq!(registry.encode("gender", "female"), 0);
        assert_eq!(registry.apply("gender", "male"), Ok(1));
    }

    #[test]
    fn serializes_as_class_lists() {
        let mut registry = EncoderRegistry::new();
        registry.fit_or_extend("gender", ["male", "female"]);

        let json = serde_json::to_string(&registry).unwrap();
        assert_eq!(json, r#"{"encoders":{"gender":["male","female"]}}"#);

        let restored: EncoderRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, registry);
        assert_eq!(restored.apply("gender", "female"), Ok(1));
    }
}
