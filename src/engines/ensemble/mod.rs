//! Final predictor: a fixed weighted average of refit pipelines.

pub mod builder;

pub use builder::{greedy_weights, EnsembleBuilder};

use crate::error::{AutopipeError, Result};
use crate::functions::traits::{collapse_output, Estimator};
use crate::types::Task;
use ndarray::{Array1, Array2};
use serde::Serialize;

/// A pipeline fitted on the full training data, with its weight
pub struct EnsembleMember {
    pub canonical: String,
    pub weight: f64,
    /// Cross-validation score the member was selected with
    pub score: f64,
    model: Box<dyn Estimator>,
}

impl EnsembleMember {
    pub fn new(canonical: impl Into<String>, weight: f64, score: f64, model: Box<dyn Estimator>) -> Self {
        Self {
            canonical: canonical.into(),
            weight,
            score,
            model,
        }
    }
}

/// Loggable view of one member
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberSummary {
    pub pipeline: String,
    pub weight: f64,
    pub score: f64,
}

/// Immutable once built. Classification output is the weighted average of
/// class probabilities, regression output the weighted average prediction.
pub struct Ensemble {
    task: Task,
    width: usize,
    members: Vec<EnsembleMember>,
    fallback: bool,
}

impl Ensemble {
    pub fn new(task: Task, width: usize, members: Vec<EnsembleMember>, fallback: bool) -> Result<Self> {
        if members.is_empty() {
            return Err(AutopipeError::Evaluation("ensemble has no members".to_string()));
        }
        if members.iter().any(|m| !(m.weight.is_finite() && m.weight > 0.0)) {
            return Err(AutopipeError::Evaluation(
                "ensemble weights must be positive".to_string(),
            ));
        }
        Ok(Self {
            task,
            width,
            members,
            fallback,
        })
    }

    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    pub fn summary(&self) -> Vec<MemberSummary> {
        self.members
            .iter()
            .map(|m| MemberSummary {
                pipeline: m.canonical.clone(),
                weight: m.weight,
                score: m.score,
            })
            .collect()
    }

    /// Whether the ensemble is the baseline stand-in for a failed search
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// `(n_samples, n_classes)` probabilities or `(n_samples, 1)` predictions
    pub fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let total: f64 = self.members.iter().map(|m| m.weight).sum();
        let mut combined = Array2::<f64>::zeros((x.nrows(), self.width));
        for member in &self.members {
            let output = member
                .model
                .predict_output(x)
                .map_err(|e| AutopipeError::Evaluation(format!("{}: {:#}", member.canonical, e)))?;
            if output.dim() != combined.dim() {
                return Err(AutopipeError::Evaluation(format!(
                    "{} produced output of shape {:?}, expected {:?}",
                    member.canonical,
                    output.dim(),
                    combined.dim()
                )));
            }
            combined.scaled_add(member.weight / total, &output);
        }
        Ok(combined)
    }

    /// `(n_samples,)` class indices or regression predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(collapse_output(self.task, &self.predict_output(x)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AnyResult;
    use crate::functions::traits::FitContext;
    use ndarray::array;

    struct Constant(Vec<f64>);

    impl Estimator for Constant {
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>, _ctx: &FitContext) -> AnyResult<()> {
            Ok(())
        }

        fn predict_output(&self, x: &Array2<f64>) -> AnyResult<Array2<f64>> {
            Ok(Array2::from_shape_fn((x.nrows(), self.0.len()), |(_, c)| self.0[c]))
        }
    }

    #[test]
    fn test_weighted_probability_average() {
        let ensemble = Ensemble::new(
            Task::Classification,
            2,
            vec![
                EnsembleMember::new("a", 1.0, 0.0, Box::new(Constant(vec![1.0, 0.0]))),
                EnsembleMember::new("b", 3.0, 0.0, Box::new(Constant(vec![0.0, 1.0]))),
            ],
            false,
        )
        .unwrap();
        let x = array![[0.0], [1.0], [2.0]];
        let proba = ensemble.predict_output(&x).unwrap();
        assert_eq!(proba.dim(), (3, 2));
        assert!((proba[[0, 0]] - 0.25).abs() < 1e-12);
        assert_eq!(ensemble.predict(&x).unwrap(), array![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_regression_shape() {
        let ensemble = Ensemble::new(
            Task::Regression,
            1,
            vec![
                EnsembleMember::new("a", 1.0, 0.0, Box::new(Constant(vec![2.0]))),
                EnsembleMember::new("b", 1.0, 0.0, Box::new(Constant(vec![4.0]))),
            ],
            false,
        )
        .unwrap();
        let predictions = ensemble.predict(&array![[0.0], [0.0]]).unwrap();
        assert_eq!(predictions, array![3.0, 3.0]);
        assert_eq!(ensemble.summary().len(), 2);
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        assert!(Ensemble::new(Task::Regression, 1, Vec::new(), false).is_err());
        let wide = Ensemble::new(
            Task::Regression,
            1,
            vec![EnsembleMember::new("a", 1.0, 0.0, Box::new(Constant(vec![1.0, 2.0])))],
            false,
        )
        .unwrap();
        assert!(wide.predict(&array![[0.0]]).is_err());
    }
}
