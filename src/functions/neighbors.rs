use super::traits::{class_indices, ensure_width, Estimator, FitContext};
use anyhow::{bail, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    Uniform,
    Distance,
}

/// Brute-force Minkowski neighbour search shared by both k-NN estimators
struct NeighborSearch {
    k: usize,
    weighting: Weighting,
    p: usize,
    train: Option<(Array2<f64>, Array1<f64>)>,
}

impl NeighborSearch {
    fn new(k: usize, weights: &str, p: usize) -> Result<Self> {
        let weighting = match weights {
            "uniform" => Weighting::Uniform,
            "distance" => Weighting::Distance,
            other => bail!("unknown neighbour weighting '{}'", other),
        };
        if p != 1 && p != 2 {
            bail!("minkowski power must be 1 or 2, got {}", p);
        }
        if k == 0 {
            bail!("n_neighbors must be positive");
        }
        Ok(Self {
            k,
            weighting,
            p,
            train: None,
        })
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            bail!("neighbour search needs at least one sample");
        }
        self.train = Some((x.clone(), y.clone()));
        Ok(())
    }

    fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self.p {
            1 => a.iter().zip(b.iter()).map(|(p, q)| (p - q).abs()).sum(),
            _ => a
                .iter()
                .zip(b.iter())
                .map(|(p, q)| (p - q).powi(2))
                .sum::<f64>()
                .sqrt(),
        }
    }

    /// (target, weight) of the k nearest training samples
    fn neighbors(&self, row: ArrayView1<f64>) -> Result<Vec<(f64, f64)>> {
        let Some((train_x, train_y)) = &self.train else {
            bail!("neighbour estimator is not fitted");
        };
        let mut dist: Vec<(f64, usize)> = train_x
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, t)| (self.distance(row, t), i))
            .collect();
        let k = self.k.min(dist.len());
        if k < dist.len() {
            dist.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            dist.truncate(k);
        }

        let exact = dist.iter().any(|(d, _)| *d == 0.0);
        Ok(dist
            .into_iter()
            .map(|(d, i)| {
                let weight = match self.weighting {
                    Weighting::Uniform => 1.0,
                    Weighting::Distance if exact => f64::from(u8::from(d == 0.0)),
                    Weighting::Distance => 1.0 / d,
                };
                (train_y[i], weight)
            })
            .collect())
    }

    fn width(&self) -> Result<usize> {
        match &self.train {
            Some((x, _)) => Ok(x.ncols()),
            None => bail!("neighbour estimator is not fitted"),
        }
    }
}

// --- Classifier ---
pub struct KNeighborsClassifier {
    search: NeighborSearch,
    n_classes: usize,
}

impl KNeighborsClassifier {
    pub fn new(k: usize, weights: &str, p: usize, n_classes: usize) -> Result<Self> {
        Ok(Self {
            search: NeighborSearch::new(k, weights, p)?,
            n_classes,
        })
    }
}

impl Estimator for KNeighborsClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, _ctx: &FitContext) -> Result<()> {
        class_indices(y, self.n_classes)?;
        self.search.fit(x, y)
    }

    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        ensure_width(x, self.search.width()?, "KNeighborsClassifier")?;
        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (r, row) in x.axis_iter(Axis(0)).enumerate() {
            let neighbors = self.search.neighbors(row)?;
            let total: f64 = neighbors.iter().map(|(_, w)| w).sum();
            for (class, weight) in neighbors {
                out[[r, class as usize]] += weight / total;
            }
        }
        Ok(out)
    }
}

// --- Regressor ---
pub struct KNeighborsRegressor {
    search: NeighborSearch,
}

impl KNeighborsRegressor {
    pub fn new(k: usize, weights: &str, p: usize) -> Result<Self> {
        Ok(Self {
            search: NeighborSearch::new(k, weights, p)?,
        })
    }
}

impl Estimator for KNeighborsRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, _ctx: &FitContext) -> Result<()> {
        self.search.fit(x, y)
    }

    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        ensure_width(x, self.search.width()?, "KNeighborsRegressor")?;
        let mut out = Array2::zeros((x.nrows(), 1));
        for (r, row) in x.axis_iter(Axis(0)).enumerate() {
            let neighbors = self.search.neighbors(row)?;
            let total: f64 = neighbors.iter().map(|(_, w)| w).sum();
            out[[r, 0]] = neighbors.iter().map(|(v, w)| v * w).sum::<f64>() / total;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_votes() {
        let x = array![[0.0], [0.1], [1.0], [1.1], [1.2]];
        let y = array![0.0, 0.0, 1.0, 1.0, 1.0];
        let mut knn = KNeighborsClassifier::new(3, "uniform", 2, 2).unwrap();
        knn.fit(&x, &y, &FitContext::unbounded()).unwrap();
        let proba = knn.predict_output(&array![[1.05]]).unwrap();
        assert_eq!(proba, array![[0.0, 1.0]]);
    }

    #[test]
    fn test_distance_weighting_exact_match() {
        let x = array![[0.0], [1.0]];
        let y = array![10.0, 20.0];
        let mut knn = KNeighborsRegressor::new(2, "distance", 1).unwrap();
        knn.fit(&x, &y, &FitContext::unbounded()).unwrap();
        let out = knn.predict_output(&array![[1.0], [0.25]]).unwrap();
        assert_eq!(out[[0, 0]], 20.0);
        assert!((out[[1, 0]] - 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let x = array![[0.0], [2.0]];
        let y = array![1.0, 3.0];
        let mut knn = KNeighborsRegressor::new(50, "uniform", 2).unwrap();
        knn.fit(&x, &y, &FitContext::unbounded()).unwrap();
        assert_eq!(knn.predict_output(&array![[5.0]]).unwrap(), array![[2.0]]);
    }

    #[test]
    fn test_rejects_unknown_weighting() {
        assert!(KNeighborsRegressor::new(3, "triangular", 2).is_err());
    }
}
