use super::traits::{class_indices, ensure_width, BuildContext, Estimator, FitContext};
use anyhow::{bail, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{rngs::StdRng, seq::index, SeedableRng};

/// Split quality measure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    Gini,
    Entropy,
    SquaredError,
}

impl Criterion {
    pub fn classification(name: &str) -> Result<Self> {
        match name {
            "gini" => Ok(Criterion::Gini),
            "entropy" => Ok(Criterion::Entropy),
            other => bail!("unknown classification criterion '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TreeSettings {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split; all of them when `None`
    pub max_features: Option<usize>,
}

/// Encoded training targets
#[derive(Debug, Clone, Copy)]
pub enum Targets<'a> {
    Classes { labels: &'a [usize], n_classes: usize },
    Values(&'a [f64]),
}

impl Targets<'_> {
    fn width(&self) -> usize {
        match self {
            Targets::Classes { n_classes, .. } => *n_classes,
            Targets::Values(_) => 1,
        }
    }
}

/// Running statistics of the samples on one side of a split
#[derive(Debug, Clone)]
struct Accumulator {
    n: f64,
    counts: Vec<f64>,
    sum: f64,
    sumsq: f64,
}

impl Accumulator {
    fn new(width: usize) -> Self {
        Self {
            n: 0.0,
            counts: vec![0.0; width],
            sum: 0.0,
            sumsq: 0.0,
        }
    }

    fn add(&mut self, targets: &Targets, sample: usize) {
        self.n += 1.0;
        match targets {
            Targets::Classes { labels, .. } => self.counts[labels[sample]] += 1.0,
            Targets::Values(values) => {
                let v = values[sample];
                self.sum += v;
                self.sumsq += v * v;
            }
        }
    }

    fn minus(&self, other: &Accumulator) -> Accumulator {
        Accumulator {
            n: self.n - other.n,
            counts: self
                .counts
                .iter()
                .zip(&other.counts)
                .map(|(a, b)| a - b)
                .collect(),
            sum: self.sum - other.sum,
            sumsq: self.sumsq - other.sumsq,
        }
    }

    /// Impurity weighted by sample count
    fn cost(&self, criterion: Criterion) -> f64 {
        if self.n <= 0.0 {
            return 0.0;
        }
        match criterion {
            Criterion::Gini => self.n - self.counts.iter().map(|c| c * c).sum::<f64>() / self.n,
            Criterion::Entropy => -self
                .counts
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|&c| c * (c / self.n).ln())
                .sum::<f64>(),
            Criterion::SquaredError => (self.sumsq - self.sum * self.sum / self.n).max(0.0),
        }
    }

    fn leaf_value(&self, targets: &Targets) -> Vec<f64> {
        match targets {
            Targets::Classes { .. } => self.counts.iter().map(|c| c / self.n).collect(),
            Targets::Values(_) => vec![self.sum / self.n],
        }
    }
}

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf(Vec<f64>),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART tree stored as a node arena, root at index 0.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<TreeNode>,
    n_features: usize,
    width: usize,
}

struct Builder<'a> {
    x: &'a Array2<f64>,
    targets: Targets<'a>,
    settings: &'a TreeSettings,
    rng: &'a mut StdRng,
    ctx: &'a FitContext,
    nodes: Vec<TreeNode>,
}

impl Tree {
    /// Grows a tree on the rows listed in `samples` (duplicates allowed).
    pub fn fit(
        x: &Array2<f64>,
        targets: Targets,
        samples: &mut [usize],
        settings: &TreeSettings,
        rng: &mut StdRng,
        ctx: &FitContext,
    ) -> Result<Self> {
        if samples.is_empty() {
            bail!("a tree needs at least one sample");
        }
        let mut builder = Builder {
            x,
            targets,
            settings,
            rng,
            ctx,
            nodes: Vec::new(),
        };
        builder.grow(samples, 0)?;
        Ok(Tree {
            nodes: builder.nodes,
            n_features: x.ncols(),
            width: targets.width(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                TreeNode::Leaf(value) => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => at = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x.nrows(), self.width));
        for (r, row) in x.axis_iter(Axis(0)).enumerate() {
            for (c, v) in self.predict_row(row).iter().enumerate() {
                out[[r, c]] = *v;
            }
        }
        out
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], at: usize) -> usize {
            match &nodes[at] {
                TreeNode::Leaf(_) => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

impl Builder<'_> {
    fn grow(&mut self, samples: &mut [usize], depth: usize) -> Result<usize> {
        self.ctx.check()?;

        let mut stats = Accumulator::new(self.targets.width());
        for &s in samples.iter() {
            stats.add(&self.targets, s);
        }
        let id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf(stats.leaf_value(&self.targets)));

        let splittable = samples.len() >= self.settings.min_samples_split.max(2)
            && self.settings.max_depth.map_or(true, |d| depth < d)
            && stats.cost(self.settings.criterion) > 1e-12;
        if !splittable {
            return Ok(id);
        }
        let Some((feature, threshold)) = self.best_split(samples, &stats) else {
            return Ok(id);
        };

        let x = self.x;
        let mid = partition(samples, |s| x[[s, feature]] <= threshold);
        if mid == 0 || mid == samples.len() {
            return Ok(id);
        }
        let (left_samples, right_samples) = samples.split_at_mut(mid);
        let left = self.grow(left_samples, depth + 1)?;
        let right = self.grow(right_samples, depth + 1)?;
        self.nodes[id] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        Ok(id)
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let d = self.x.ncols();
        match self.settings.max_features {
            Some(k) if k < d => index::sample(&mut *self.rng, d, k.max(1)).into_vec(),
            _ => (0..d).collect(),
        }
    }

    fn best_split(&mut self, samples: &[usize], total: &Accumulator) -> Option<(usize, f64)> {
        let min_leaf = self.settings.min_samples_leaf.max(1);
        let criterion = self.settings.criterion;
        let mut best: Option<(f64, usize, f64)> = None;

        for feature in self.candidate_features() {
            let mut order: Vec<(f64, usize)> =
                samples.iter().map(|&s| (self.x[[s, feature]], s)).collect();
            order.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let mut left = Accumulator::new(self.targets.width());
            for pos in 0..order.len() - 1 {
                left.add(&self.targets, order[pos].1);
                let (lo, hi) = (order[pos].0, order[pos + 1].0);
                if !(lo < hi) {
                    continue;
                }
                let n_left = pos + 1;
                if n_left < min_leaf || order.len() - n_left < min_leaf {
                    continue;
                }
                let cost = left.cost(criterion) + total.minus(&left).cost(criterion);
                if best.map_or(true, |(c, _, _)| cost < c - 1e-12) {
                    let mid = lo + (hi - lo) / 2.0;
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some((cost, feature, threshold));
                }
            }
        }
        best.map(|(_, feature, threshold)| (feature, threshold))
    }
}

/// Moves the samples satisfying `left` to the front, returning their count.
fn partition(samples: &mut [usize], left: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..samples.len() {
        if left(samples[i]) {
            samples.swap(i, mid);
            mid += 1;
        }
    }
    mid
}

fn depth_limit(max_depth: usize) -> Option<usize> {
    (max_depth > 0).then_some(max_depth)
}

// --- Decision Tree Classifier ---
pub struct DecisionTreeClassifier {
    settings: TreeSettings,
    n_classes: usize,
    seed: u64,
    tree: Option<Tree>,
}

impl DecisionTreeClassifier {
    pub fn new(
        criterion: &str,
        max_depth: usize,
        min_samples_split: usize,
        min_samples_leaf: usize,
        ctx: &BuildContext,
    ) -> Result<Self> {
        Ok(Self {
            settings: TreeSettings {
                criterion: Criterion::classification(criterion)?,
                max_depth: depth_limit(max_depth),
                min_samples_split,
                min_samples_leaf,
                max_features: None,
            },
            n_classes: ctx.n_classes,
            seed: ctx.random_state,
            tree: None,
        })
    }
}

impl Estimator for DecisionTreeClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<()> {
        let labels = class_indices(y, self.n_classes)?;
        let targets = Targets::Classes {
            labels: &labels,
            n_classes: self.n_classes,
        };
        let mut samples: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.tree = Some(Tree::fit(x, targets, &mut samples, &self.settings, &mut rng, ctx)?);
        Ok(())
    }

    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some(tree) = &self.tree else {
            bail!("DecisionTreeClassifier is not fitted");
        };
        ensure_width(x, tree.n_features(), "DecisionTreeClassifier")?;
        Ok(tree.predict(x))
    }
}

// --- Decision Tree Regressor ---
pub struct DecisionTreeRegressor {
    settings: TreeSettings,
    seed: u64,
    tree: Option<Tree>,
}

impl DecisionTreeRegressor {
    pub fn new(
        max_depth: usize,
        min_samples_split: usize,
        min_samples_leaf: usize,
        ctx: &BuildContext,
    ) -> Result<Self> {
        Ok(Self {
            settings: TreeSettings {
                criterion: Criterion::SquaredError,
                max_depth: depth_limit(max_depth),
                min_samples_split,
                min_samples_leaf,
                max_features: None,
            },
            seed: ctx.random_state,
            tree: None,
        })
    }
}

impl Estimator for DecisionTreeRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<()> {
        let values = y.to_vec();
        let mut samples: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.tree = Some(Tree::fit(
            x,
            Targets::Values(&values),
            &mut samples,
            &self.settings,
            &mut rng,
            ctx,
        )?);
        Ok(())
    }

    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some(tree) = &self.tree else {
            bail!("DecisionTreeRegressor is not fitted");
        };
        ensure_width(x, tree.n_features(), "DecisionTreeRegressor")?;
        Ok(tree.predict(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::traits::Interrupted;
    use crate::types::Task;
    use crate::utils::Deadline;
    use ndarray::array;

    fn ctx(task: Task, n_classes: usize) -> BuildContext {
        BuildContext {
            task,
            n_classes,
            random_state: 0,
        }
    }

    #[test]
    fn test_classifier_fits_xor() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 1.0, 1.0, 0.0];
        let mut tree =
            DecisionTreeClassifier::new("gini", 2, 2, 1, &ctx(Task::Classification, 2)).unwrap();
        tree.fit(&x, &y, &FitContext::unbounded()).unwrap();
        let proba = tree.predict_output(&x).unwrap();
        for (r, &label) in y.iter().enumerate() {
            assert_eq!(proba[[r, label as usize]], 1.0);
        }
    }

    #[test]
    fn test_regressor_stump() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![1.0, 1.0, 1.0, 5.0, 5.0, 5.0];
        let mut tree = DecisionTreeRegressor::new(1, 2, 1, &ctx(Task::Regression, 1)).unwrap();
        tree.fit(&x, &y, &FitContext::unbounded()).unwrap();
        let out = tree.predict_output(&array![[0.0], [6.4], [20.0]]).unwrap();
        assert_eq!(out, array![[1.0], [1.0], [5.0]]);
        assert_eq!(tree.tree.as_ref().unwrap().depth(), 1);
    }

    #[test]
    fn test_min_samples_leaf_blocks_split() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 0.0, 9.0];
        let mut tree = DecisionTreeRegressor::new(5, 2, 2, &ctx(Task::Regression, 1)).unwrap();
        tree.fit(&x, &y, &FitContext::unbounded()).unwrap();
        assert_eq!(tree.tree.as_ref().unwrap().depth(), 0);
    }

    #[test]
    fn test_expired_deadline_interrupts_fit() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let mut tree = DecisionTreeRegressor::new(3, 2, 1, &ctx(Task::Regression, 1)).unwrap();
        let deadline = Deadline::unbounded();
        deadline.cancel();
        let err = tree.fit(&x, &y, &FitContext::new(deadline)).unwrap_err();
        assert!(err.downcast_ref::<Interrupted>().is_some());
    }

    #[test]
    fn test_unknown_criterion() {
        assert!(DecisionTreeClassifier::new("mse", 3, 2, 1, &ctx(Task::Classification, 2)).is_err());
    }
}
