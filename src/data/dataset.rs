use crate::error::{AutopipeError, Result};
use crate::types::Task;
use log::warn;
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Numeric training data: feature matrix, target column and feature names.
/// Features may hold NaN for missing values; the target may not.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
}

impl Dataset {
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        let feature_names = (0..x.ncols()).map(|i| format!("x{}", i)).collect();
        let dataset = Self { x, y, feature_names };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Splits `df` into features (every column but `target`, cast to f64,
    /// nulls as NaN) and the target column.
    pub fn from_dataframe(df: &DataFrame, target: &str) -> Result<Self> {
        let target_column = df
            .column(target)
            .map_err(|_| AutopipeError::Data(format!("target column '{}' not found", target)))?;
        if target_column.null_count() > 0 {
            return Err(AutopipeError::Data(format!(
                "target column '{}' has {} missing values",
                target,
                target_column.null_count()
            )));
        }
        let y: Array1<f64> = column_values(target_column)?.into_iter().collect();

        let features: Vec<&Column> = df
            .get_columns()
            .iter()
            .filter(|c| c.name().as_str() != target)
            .collect();
        let mut x = Array2::<f64>::zeros((df.height(), features.len()));
        for (j, column) in features.iter().enumerate() {
            if matches!(column.dtype(), DataType::String) {
                warn!("column '{}' is text; values that do not parse as numbers become missing", column.name());
            }
            for (i, value) in column_values(column)?.into_iter().enumerate() {
                x[[i, j]] = value;
            }
        }

        let dataset = Self {
            x,
            y,
            feature_names: features.iter().map(|c| c.name().to_string()).collect(),
        };
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn validate(&self) -> Result<()> {
        if self.x.nrows() != self.y.len() {
            return Err(AutopipeError::Data(format!(
                "feature matrix has {} rows but target has {}",
                self.x.nrows(),
                self.y.len()
            )));
        }
        if self.x.nrows() < 2 || self.x.ncols() == 0 {
            return Err(AutopipeError::Data(
                "need at least two samples and one feature".to_string(),
            ));
        }
        if self.y.iter().any(|v| !v.is_finite()) {
            return Err(AutopipeError::Data("target contains missing or infinite values".to_string()));
        }
        Ok(())
    }
}

fn column_values(column: &Column) -> Result<Vec<f64>> {
    let cast = column.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Maps arbitrary numeric class labels to indices `0..n_classes`, in
/// ascending label order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEncoder {
    classes: Vec<f64>,
}

impl LabelEncoder {
    pub fn fit(y: &Array1<f64>) -> Result<Self> {
        let mut classes: Vec<f64> = y.to_vec();
        if classes.iter().any(|v| !v.is_finite()) {
            return Err(AutopipeError::Data("class labels must be finite".to_string()));
        }
        classes.sort_by(f64::total_cmp);
        classes.dedup();
        if classes.len() < 2 {
            return Err(AutopipeError::Data(format!(
                "classification needs at least two classes, found {}",
                classes.len()
            )));
        }
        Ok(Self { classes })
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn encode(&self, y: &Array1<f64>) -> Result<Array1<f64>> {
        y.iter()
            .map(|v| {
                self.classes
                    .binary_search_by(|c| c.total_cmp(v))
                    .map(|i| i as f64)
                    .map_err(|_| AutopipeError::Data(format!("unseen class label {}", v)))
            })
            .collect()
    }

    /// Class indices back to the original labels
    pub fn decode(&self, indices: &Array1<f64>) -> Array1<f64> {
        indices.mapv(|i| self.classes[(i as usize).min(self.classes.len() - 1)])
    }
}

/// Number of output columns a task produces for these targets
pub fn output_classes(task: Task, encoder: Option<&LabelEncoder>) -> usize {
    match (task, encoder) {
        (Task::Classification, Some(encoder)) => encoder.n_classes(),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_label_encoder() {
        let y = array![5.0, -1.0, 5.0, 2.0];
        let encoder = LabelEncoder::fit(&y).unwrap();
        assert_eq!(encoder.classes(), &[-1.0, 2.0, 5.0]);
        let encoded = encoder.encode(&y).unwrap();
        assert_eq!(encoded, array![2.0, 0.0, 2.0, 1.0]);
        assert_eq!(encoder.decode(&encoded), y);
        assert!(encoder.encode(&array![3.0]).is_err());
    }

    #[test]
    fn test_single_class_rejected() {
        assert!(matches!(
            LabelEncoder::fit(&array![1.0, 1.0]),
            Err(AutopipeError::Data(_))
        ));
    }

    #[test]
    fn test_from_dataframe() {
        let df = df!(
            "a" => [Some(1.0), None, Some(3.0)],
            "b" => [1i64, 2, 3],
            "target" => [0.0, 1.0, 0.0]
        )
        .unwrap();
        let dataset = Dataset::from_dataframe(&df, "target").unwrap();
        assert_eq!(dataset.feature_names, vec!["a", "b"]);
        assert!(dataset.x[[1, 0]].is_nan());
        assert_eq!(dataset.x[[2, 1]], 3.0);
        assert_eq!(dataset.y, array![0.0, 1.0, 0.0]);
        assert!(Dataset::from_dataframe(&df, "missing").is_err());
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        assert!(Dataset::new(Array2::zeros((3, 2)), array![1.0, 2.0]).is_err());
    }
}
