use crate::error::{AutopipeError, Result};
use polars::prelude::*;
use std::path::Path;

pub struct CsvConnector;

impl CsvConnector {
    /// Load CSV file into DataFrame
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()
            .map_err(|e| AutopipeError::Data(format!("Failed to read CSV: {}", e)))?;

        let nulls = Self::null_counts(&df);
        if !nulls.is_empty() {
            log::warn!("Missing values detected: {:?}", nulls);
        }
        Ok(df)
    }

    /// Columns holding nulls, with their null counts
    pub fn null_counts(df: &DataFrame) -> Vec<(String, usize)> {
        df.get_columns()
            .iter()
            .filter(|c| c.null_count() > 0)
            .map(|c| (c.name().to_string(), c.null_count()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reports_missing_values() {
        let path = std::env::temp_dir().join(format!("autopipe-csv-{}.csv", std::process::id()));
        std::fs::write(&path, "a,b,target\n1.0,,0\n2.0,3.0,1\n").unwrap();
        let df = CsvConnector::load(&path).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(CsvConnector::null_counts(&df), vec![("b".to_string(), 1)]);
        std::fs::remove_file(&path).ok();
    }
}
