use super::traits::{class_indices, BuildContext, Estimator, FitContext};
use crate::types::Task;
use anyhow::{bail, Result};
use ndarray::{Array1, Array2};

/// Predicts the training mean (regression) or the class prior (classification).
pub struct DummyEstimator {
    task: Task,
    n_classes: usize,
    output: Option<Vec<f64>>,
}

impl DummyEstimator {
    pub fn new(ctx: &BuildContext) -> Self {
        Self {
            task: ctx.task,
            n_classes: ctx.n_classes,
            output: None,
        }
    }
}

impl Estimator for DummyEstimator {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<f64>, _ctx: &FitContext) -> Result<()> {
        if y.is_empty() {
            bail!("DummyEstimator needs at least one sample");
        }
        let output = match self.task {
            Task::Regression => vec![y.sum() / y.len() as f64],
            Task::Classification => {
                let mut prior = vec![0.0; self.n_classes];
                for c in class_indices(y, self.n_classes)? {
                    prior[c] += 1.0;
                }
                prior.iter().map(|n| n / y.len() as f64).collect()
            }
        };
        self.output = Some(output);
        Ok(())
    }

    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some(output) = &self.output else {
            bail!("DummyEstimator is not fitted");
        };
        Ok(Array2::from_shape_fn((x.nrows(), output.len()), |(_, c)| output[c]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_class_prior() {
        let ctx = BuildContext {
            task: Task::Classification,
            n_classes: 2,
            random_state: 0,
        };
        let mut dummy = DummyEstimator::new(&ctx);
        dummy
            .fit(&array![[0.0], [0.0], [0.0], [0.0]], &array![0.0, 1.0, 1.0, 1.0], &FitContext::unbounded())
            .unwrap();
        let out = dummy.predict_output(&array![[1.0]]).unwrap();
        assert_eq!(out, array![[0.25, 0.75]]);
    }
}
