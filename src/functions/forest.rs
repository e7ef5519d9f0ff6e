use super::traits::{class_indices, ensure_width, BuildContext, Estimator, FitContext};
use super::tree::{Criterion, Targets, Tree, TreeSettings};
use anyhow::{bail, Result};
use log::debug;
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Bagged ensemble of CART trees, shared by both forest estimators.
struct Forest {
    n_estimators: usize,
    max_features: f64,
    bootstrap: bool,
    settings: TreeSettings,
    seed: u64,
    trees: Vec<Tree>,
}

impl Forest {
    fn new(
        n_estimators: usize,
        criterion: Criterion,
        max_features: f64,
        min_samples_split: usize,
        min_samples_leaf: usize,
        bootstrap: bool,
        seed: u64,
    ) -> Result<Self> {
        if n_estimators == 0 {
            bail!("n_estimators must be positive");
        }
        if !(max_features > 0.0 && max_features <= 1.0) {
            bail!("max_features must be a fraction in (0, 1], got {}", max_features);
        }
        Ok(Self {
            n_estimators,
            max_features,
            bootstrap,
            settings: TreeSettings {
                criterion,
                max_depth: None,
                min_samples_split,
                min_samples_leaf,
                max_features: None,
            },
            seed,
            trees: Vec::new(),
        })
    }

    fn fit(&mut self, x: &Array2<f64>, targets: Targets, ctx: &FitContext) -> Result<()> {
        let n = x.nrows();
        if n == 0 {
            bail!("a forest needs at least one sample");
        }
        let d = x.ncols();
        let per_split = ((self.max_features * d as f64).ceil() as usize).clamp(1, d.max(1));
        let settings = TreeSettings {
            max_features: Some(per_split),
            ..self.settings
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.n_estimators.min(1024));
        for _ in 0..self.n_estimators {
            ctx.check()?;
            let mut samples: Vec<usize> = if self.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            trees.push(Tree::fit(x, targets, &mut samples, &settings, &mut rng, ctx)?);
        }
        debug!("grew {} trees using {} of {} features per split", trees.len(), per_split, d);
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>, name: &str) -> Result<Array2<f64>> {
        let Some(first) = self.trees.first() else {
            bail!("{} is not fitted", name);
        };
        ensure_width(x, first.n_features(), name)?;
        let mut out = first.predict(x);
        for tree in &self.trees[1..] {
            out += &tree.predict(x);
        }
        out /= self.trees.len() as f64;
        Ok(out)
    }
}

// --- Random Forest Classifier ---
pub struct RandomForestClassifier {
    forest: Forest,
    n_classes: usize,
}

impl RandomForestClassifier {
    pub fn new(
        n_estimators: usize,
        criterion: &str,
        max_features: f64,
        min_samples_split: usize,
        min_samples_leaf: usize,
        bootstrap: bool,
        ctx: &BuildContext,
    ) -> Result<Self> {
        Ok(Self {
            forest: Forest::new(
                n_estimators,
                Criterion::classification(criterion)?,
                max_features,
                min_samples_split,
                min_samples_leaf,
                bootstrap,
                ctx.random_state,
            )?,
            n_classes: ctx.n_classes,
        })
    }
}

impl Estimator for RandomForestClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<()> {
        let labels = class_indices(y, self.n_classes)?;
        let targets = Targets::Classes {
            labels: &labels,
            n_classes: self.n_classes,
        };
        self.forest.fit(x, targets, ctx)
    }

    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.forest.predict(x, "RandomForestClassifier")
    }
}

// --- Random Forest Regressor ---
pub struct RandomForestRegressor {
    forest: Forest,
}

impl RandomForestRegressor {
    pub fn new(
        n_estimators: usize,
        max_features: f64,
        min_samples_split: usize,
        min_samples_leaf: usize,
        bootstrap: bool,
        ctx: &BuildContext,
    ) -> Result<Self> {
        Ok(Self {
            forest: Forest::new(
                n_estimators,
                Criterion::SquaredError,
                max_features,
                min_samples_split,
                min_samples_leaf,
                bootstrap,
                ctx.random_state,
            )?,
        })
    }
}

impl Estimator for RandomForestRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<()> {
        let values = y.to_vec();
        self.forest.fit(x, Targets::Values(&values), ctx)
    }

    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.forest.predict(x, "RandomForestRegressor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Task;
    use ndarray::array;

    fn ctx(task: Task, n_classes: usize, random_state: u64) -> BuildContext {
        BuildContext {
            task,
            n_classes,
            random_state,
        }
    }

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.1],
            [0.2, 0.0],
            [0.1, 0.3],
            [0.3, 0.2],
            [5.0, 5.1],
            [5.2, 4.9],
            [4.8, 5.3],
            [5.1, 5.0]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_classifier_separates_blobs() {
        let (x, y) = blobs();
        let mut forest = RandomForestClassifier::new(
            10,
            "gini",
            0.5,
            2,
            1,
            false,
            &ctx(Task::Classification, 2, 0),
        )
        .unwrap();
        forest.fit(&x, &y, &FitContext::unbounded()).unwrap();
        let proba = forest.predict_output(&array![[0.1, 0.1], [5.0, 5.0]]).unwrap();
        assert_eq!(proba[[0, 0]], 1.0);
        assert_eq!(proba[[1, 1]], 1.0);
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let (x, y) = blobs();
        let fit = |seed| {
            let mut forest =
                RandomForestRegressor::new(5, 0.5, 2, 1, true, &ctx(Task::Regression, 1, seed))
                    .unwrap();
            forest.fit(&x, &y, &FitContext::unbounded()).unwrap();
            forest.predict_output(&array![[2.5, 2.5]]).unwrap()
        };
        assert_eq!(fit(7), fit(7));
    }

    #[test]
    fn test_rejects_bad_fraction() {
        assert!(RandomForestRegressor::new(5, 0.0, 2, 1, true, &ctx(Task::Regression, 1, 0)).is_err());
    }
}
