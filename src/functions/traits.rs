use crate::types::Task;
use crate::utils::Deadline;
use anyhow::{bail, Result};
use ndarray::{Array1, Array2, Axis};
use thiserror::Error;

/// Raised by component code that observed an expired deadline
#[derive(Debug, Clone, Copy, Error)]
#[error("deadline reached before the component finished")]
pub struct Interrupted;

/// Runtime context handed to every fit call
#[derive(Debug, Clone)]
pub struct FitContext {
    pub deadline: Deadline,
}

impl FitContext {
    pub fn new(deadline: Deadline) -> Self {
        Self { deadline }
    }

    pub fn unbounded() -> Self {
        Self::new(Deadline::unbounded())
    }

    pub fn check(&self) -> Result<()> {
        self.deadline.check()
    }
}

/// Facts a component factory needs at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildContext {
    pub task: Task,
    /// Number of classes for classification, 1 for regression
    pub n_classes: usize,
    pub random_state: u64,
}

impl BuildContext {
    pub fn output_width(&self) -> usize {
        match self.task {
            Task::Classification => self.n_classes,
            Task::Regression => 1,
        }
    }
}

/// Data transform stage
pub trait Transformer: Send + Sync {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<()>;

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Prediction-capable final stage
pub trait Estimator: Send + Sync {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<()>;

    /// Class probabilities `(n_samples, n_classes)` for classification,
    /// a single column `(n_samples, 1)` for regression.
    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Collapse estimator output to `(n_samples,)` predictions: the argmax class
/// index for classification, the single column for regression.
pub fn collapse_output(task: Task, output: &Array2<f64>) -> Array1<f64> {
    match task {
        Task::Classification => output
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0usize, f64::NEG_INFINITY), |best, (i, &p)| {
                        if p > best.1 {
                            (i, p)
                        } else {
                            best
                        }
                    })
                    .0 as f64
            })
            .collect(),
        Task::Regression => output.column(0).to_owned(),
    }
}

pub fn ensure_width(x: &Array2<f64>, expected: usize, name: &str) -> Result<()> {
    if x.ncols() != expected {
        bail!(
            "{} was fitted on {} features but received {}",
            name,
            expected,
            x.ncols()
        );
    }
    Ok(())
}

/// Class indices from an encoded target column
pub fn class_indices(y: &Array1<f64>, n_classes: usize) -> Result<Vec<usize>> {
    y.iter()
        .map(|&v| {
            let class = v as usize;
            if v < 0.0 || v.fract() != 0.0 || class >= n_classes {
                bail!("target value {} is not a class index below {}", v, n_classes);
            }
            Ok(class)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_collapse_classification_output() {
        let output = array![[0.2, 0.8], [0.9, 0.1]];
        let predictions = collapse_output(Task::Classification, &output);
        assert_eq!(predictions, array![1.0, 0.0]);
    }

    #[test]
    fn test_class_indices_rejects_out_of_range() {
        assert!(class_indices(&array![0.0, 1.0, 2.0], 2).is_err());
        assert_eq!(class_indices(&array![0.0, 1.0], 2).unwrap(), vec![0, 1]);
    }
}
