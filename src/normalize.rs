use log::debug;
use polars::prelude::*;

use crate::error::DataError;
use crate::records::{
    CategoricalColumn, Dataset, NumericColumn, StrokeRecord, LABEL_COLUMN, NUTRITION_COLUMNS,
    UNKNOWN_CATEGORY,
};

/// Turns a raw text frame into typed records.
///
/// Categoricals are trimmed, with missing or blank cells becoming `"unknown"`.
/// Numerics that fail to parse count as missing and are filled with the
/// median of the parsable values in the same column (0.0 if there are none).
/// Only the stroke label is not imputable.
pub fn normalize(df: &DataFrame) -> Result<Dataset, DataError> {
    let height = df.height();
    if height == 0 {
        return Ok(Vec::new());
    }

    let categorical = CategoricalColumn::ALL
        .iter()
        .map(|c| categorical_column(df, c.name()))
        .collect::<Result<Vec<_>, _>>()?;
    let numeric = NumericColumn::ALL
        .iter()
        .map(|c| numeric_column(df, c.name()))
        .collect::<Result<Vec<_>, _>>()?;
    let nutrition = NUTRITION_COLUMNS
        .iter()
        .map(|name| numeric_column(df, name))
        .collect::<Result<Vec<_>, _>>()?;
    let labels = label_column(df)?;

    let records = (0..height)
        .map(|row| {
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
                stroke: labels[row],
                nutrition: [0.0; 13],
            };
            for (column, values) in CategoricalColumn::ALL.iter().zip(&categorical) {
                *record.category_mut(*column) = values[row].clone();
            }
            for (column, values) in NumericColumn::ALL.iter().zip(&numeric) {
                *record.numeric_mut(*column) = values[row];
            }
            for (slot, values) in record.nutrition.iter_mut().zip(&nutrition) {
                *slot = values[row];
            }
            record
        })
        .collect();

    Ok(records)
}

fn text_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Utf8Chunked, DataError> {
    Ok(df.column(name)?.utf8()?)
}

fn categorical_column(df: &DataFrame, name: &str) -> Result<Vec<String>, DataError> {
    let values = text_column(df, name)?
        .into_iter()
        .map(|value| match value.map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => UNKNOWN_CATEGORY.to_string(),
        })
        .collect();
    Ok(values)
}

fn parse_number(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, DataError> {
    let parsed: Float64Chunked = text_column(df, name)?
        .into_iter()
        .map(parse_number)
        .collect();

    let missing = parsed.null_count();
    if missing == 0 {
        return Ok(parsed.into_no_null_iter().collect());
    }

    let median = parsed.median().unwrap_or(0.0);
    debug!("imputing {} missing {} values with median {}", missing, name, median);
    Ok(parsed
        .into_iter()
        .map(|v| v.unwrap_or(median))
        .collect())
}

fn label_column(df: &DataFrame) -> Result<Vec<u8>, DataError> {
    text_column(df, LABEL_COLUMN)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| match parse_number(value) {
            Some(v) if v == 0.0 => Ok(0),
            Some(v) if v == 1.0 => Ok(1),
            _ => Err(DataError::InvalidLabel {
                row,
                value: value.map(str::to_string),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::conform_to_raw_schema;

    fn frame(df: DataFrame) -> DataFrame {
        conform_to_raw_schema(df).unwrap()
    }

    #[test]
    fn empty_frame_is_valid() {
        let df = frame(DataFrame::default());
        assert!(normalize(&df).unwrap().is_empty());
    }

    #[test]
    fn numerics_are_median_imputed() {
        let df = frame(
            df!(
                "age" => &[Some("40"), Some("N/A"), Some("60"), Some("80")],
                "bmi" => &[Some(" 22.5 "), Some("30"), None, Some("abc")],
                "stroke" => &[Some("0"), Some("1"), Some("0"), Some("0")]
            )
            .unwrap(),
        );

        let records = normalize(&df).unwrap();

        assert_eq!(records[1].age, 60.0);
        assert_eq!(records[0].bmi, 22.5);
        assert_eq!(records[2].bmi, 26.25);
        assert_eq!(records[3].bmi, 26.25);
        // absent from the source entirely
        assert_eq!(records[0].avg_glucose_level, 0.0);
    }

    #[test]
    fn categoricals_are_trimmed_and_filled() {
        let df = frame(
            df!(
                "gender" => &[Some("  female "), None, Some("   ")],
                "stroke" => &[Some("0"), Some("0"), Some("1")]
            )
            .unwrap(),
        );

        let records = normalize(&df).unwrap();

        assert_eq!(records[0].gender, "female");
        assert_eq!(records[1].gender, UNKNOWN_CATEGORY);
        assert_eq!(records[2].gender, UNKNOWN_CATEGORY);
        assert!(records.iter().all(|r| r.work_type == UNKNOWN_CATEGORY));
    }

    #[test]
    fn normalized_records_have_no_gaps() {
        let df = frame(
            df!(
                "gender" => &[None, Some("male")],
                "age" => &[None, Some("50")],
                "bmi" => &[Some("NaN"), None],
                "calories" => &[Some("2100"), None],
                "stroke" => &[Some("1"), Some("0.0")]
            )
            .unwrap(),
        );

        for record in normalize(&df).unwrap() {
            assert!(record.age.is_finite());
            assert!(record.bmi.is_finite());
            assert!(record.nutrition.iter().all(|v| v.is_finite()));
            assert!(!record.gender.is_empty());
        }
    }

    #[test]
    fn bad_label_is_a_data_error() {
        let df = frame(
            df!(
                "age" => &[Some("40"), Some("41")],
                "stroke" => &[Some("0"), Some("maybe")]
            )
            .unwrap(),
        );

        match normalize(&df) {
            Err(DataError::InvalidLabel { row, value }) => {
                assert_eq!(row, 1);
                assert_eq!(value.as_deref(), Some("maybe"));
            }
            other => panic!("expected InvalidLabel, got {:?}", other),
        }
    }
}
