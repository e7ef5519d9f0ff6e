use crate::functions::traits::{Estimator, FitContext, Transformer};
use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2};

/// Executable pipeline: transformer stages applied innermost first, then the
/// final estimator.
pub struct Pipeline {
    steps: Vec<(String, Box<dyn Transformer>)>,
    estimator_name: String,
    estimator: Box<dyn Estimator>,
}

impl Pipeline {
    pub fn new(
        steps: Vec<(String, Box<dyn Transformer>)>,
        estimator_name: impl Into<String>,
        estimator: Box<dyn Estimator>,
    ) -> Self {
        Self {
            steps,
            estimator_name: estimator_name.into(),
            estimator,
        }
    }

    /// Stage names in execution order, estimator last
    pub fn step_names(&self) -> Vec<&str> {
        self.steps
            .iter()
            .map(|(name, _)| name.as_str())
            .chain(std::iter::once(self.estimator_name.as_str()))
            .collect()
    }

    fn transform_all(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut current = x.clone();
        for (name, step) in &self.steps {
            current = step
                .transform(&current)
                .with_context(|| format!("{} failed to transform", name))?;
            ensure_finite(&current, name)?;
        }
        Ok(current)
    }
}

impl Estimator for Pipeline {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<()> {
        let mut current = x.clone();
        for (name, step) in self.steps.iter_mut() {
            ctx.check()?;
            step.fit(&current, y, ctx)?;
            current = step
                .transform(&current)
                .with_context(|| format!("{} failed to transform", name))?;
            ensure_finite(&current, name)?;
        }
        ctx.check()?;
        self.estimator.fit(&current, y, ctx)
    }

    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let transformed = self.transform_all(x)?;
        self.estimator.predict_output(&transformed)
    }
}

fn ensure_finite(x: &Array2<f64>, name: &str) -> Result<()> {
    if x.ncols() == 0 {
        bail!("{} removed every feature", name);
    }
    if x.iter().any(|v| !v.is_finite()) {
        bail!("{} produced non-finite values", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::dummy::DummyEstimator;
    use crate::functions::preprocessing::{StandardScaler, VarianceThreshold};
    use crate::functions::traits::BuildContext;
    use crate::types::Task;
    use ndarray::array;

    fn regression_ctx() -> BuildContext {
        BuildContext {
            task: Task::Regression,
            n_classes: 1,
            random_state: 0,
        }
    }

    #[test]
    fn test_fit_and_predict_through_steps() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut pipeline = Pipeline::new(
            vec![("StandardScaler".to_string(), Box::new(StandardScaler::default()) as Box<dyn Transformer>)],
            "DummyEstimator",
            Box::new(DummyEstimator::new(&regression_ctx())),
        );
        pipeline.fit(&x, &y, &FitContext::unbounded()).unwrap();
        let output = pipeline.predict_output(&x).unwrap();
        assert_eq!(output.dim(), (3, 1));
        assert!((output[[0, 0]] - 2.0).abs() < 1e-12);
        assert_eq!(pipeline.step_names(), vec!["StandardScaler", "DummyEstimator"]);
    }

    #[test]
    fn test_failing_step_fails_the_pipeline() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut pipeline = Pipeline::new(
            vec![("VarianceThreshold".to_string(), Box::new(VarianceThreshold::new(0.1)) as Box<dyn Transformer>)],
            "DummyEstimator",
            Box::new(DummyEstimator::new(&regression_ctx())),
        );
        let err = pipeline.fit(&x, &y, &FitContext::unbounded()).unwrap_err();
        assert!(err.to_string().contains("variance"));
    }
}
