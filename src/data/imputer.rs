use crate::error::{AutopipeError, Result};
use ndarray::{Array1, Array2, Axis};

/// Replaces missing (NaN or infinite) feature values with the training mean
/// of their column. Columns with no observed value are filled with zero.
#[derive(Debug, Clone, Default)]
pub struct MeanImputer {
    means: Option<Array1<f64>>,
}

impl MeanImputer {
    pub fn fit(x: &Array2<f64>) -> Self {
        let means = x
            .axis_iter(Axis(1))
            .map(|column| {
                let (sum, count) = column
                    .iter()
                    .filter(|v| v.is_finite())
                    .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                if count == 0 {
                    0.0
                } else {
                    sum / count as f64
                }
            })
            .collect();
        Self { means: Some(means) }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let means = self.means.as_ref().ok_or(AutopipeError::NotFitted)?;
        if x.ncols() != means.len() {
            return Err(AutopipeError::Data(format!(
                "expected {} features, received {}",
                means.len(),
                x.ncols()
            )));
        }
        let mut out = x.clone();
        for (mut column, &mean) in out.axis_iter_mut(Axis(1)).zip(means) {
            column.mapv_inplace(|v| if v.is_finite() { v } else { mean });
        }
        Ok(out)
    }

    pub fn missing_count(x: &Array2<f64>) -> usize {
        x.iter().filter(|v| !v.is_finite()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fills_column_means() {
        let x = array![[1.0, f64::NAN], [3.0, f64::NAN], [f64::NAN, f64::NAN]];
        let imputer = MeanImputer::fit(&x);
        let filled = imputer.transform(&x).unwrap();
        assert_eq!(filled, array![[1.0, 0.0], [3.0, 0.0], [2.0, 0.0]]);
        assert_eq!(MeanImputer::missing_count(&x), 4);
    }

    #[test]
    fn test_unfitted_and_width_errors() {
        let x = array![[1.0]];
        assert!(matches!(MeanImputer::default().transform(&x), Err(AutopipeError::NotFitted)));
        let imputer = MeanImputer::fit(&array![[1.0, 2.0]]);
        assert!(imputer.transform(&x).is_err());
    }
}
