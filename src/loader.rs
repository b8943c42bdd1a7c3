use std::fs::File;
use std::path::Path;

use log::{debug, info};
use polars::prelude::*;

use crate::error::DataError;
use crate::normalize::normalize;
use crate::records::{Dataset, StrokeRecord};

pub async fn read_csv<P: AsRef<Path>>(path: P) -> Result<DataFrame, DataError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| DataError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    // No inference: every column comes back as Utf8 and the normalizer decides.
    let df = CsvReader::new(file)
        .has_header(true)
        .infer_schema(Some(0))
        .finish()?;
    debug!("read {} rows x {} columns from {:?}", df.height(), df.width(), path);

    conform_to_raw_schema(df)
}

/// Adds every column of the raw schema the source lacks as an all-null column,
/// and casts the rest to text, so downstream code sees one fixed layout.
pub fn conform_to_raw_schema(mut df: DataFrame) -> Result<DataFrame, DataError> {
    let height = df.height();
    let schema = StrokeRecord::raw_schema();
    for (name, dtype) in schema.iter() {
        let existing = df.column(name).ok().map(|s| s.dtype().clone());
        match existing {
            None => {
                debug!("column {} missing from source, treating as empty", name);
                df.with_column(Series::full_null(name, height, dtype))?;
            }
            Some(found) if &found != dtype => {
                let casted = df.column(name)?.cast(dtype)?;
                df.with_column(casted)?;
            }
            Some(_) => {}
        }
    }
    let columns: Vec<&str> = schema.iter_names().map(|name| name.as_str()).collect();
    Ok(df.select(columns)?)
}

/// Reads and normalizes a training CSV in one step.
pub async fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset, DataError> {
    let df = read_csv(&path).await?;
    let dataset = normalize(&df)?;
    info!(
        "loaded {} records from {:?}",
        dataset.len(),
        path.as_ref()
    );
    Ok(dataset)
}
