use super::traits::{class_indices, ensure_width, Estimator, FitContext};
use anyhow::{bail, Result};
use ndarray::{Array1, Array2, Axis};

/// Solves `a * x = b` by Gaussian elimination with partial pivoting.
pub fn solve_linear_system(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        bail!("linear system must be square");
    }
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < 1e-12 {
            bail!("singular matrix at column {}", col);
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}

// --- Ridge Regression ---
pub struct RidgeRegression {
    alpha: f64,
    coef: Option<(Array1<f64>, f64)>,
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Result<Self> {
        if alpha < 0.0 {
            bail!("alpha must be non-negative");
        }
        Ok(Self { alpha, coef: None })
    }
}

impl Estimator for RidgeRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<()> {
        let (Some(x_mean), Some(y_mean)) = (x.mean_axis(Axis(0)), y.mean()) else {
            bail!("RidgeRegression needs at least one sample");
        };
        let xc = x - &x_mean;
        let yc = y - y_mean;
        let mut gram = xc.t().dot(&xc);
        for i in 0..gram.nrows() {
            gram[[i, i]] += self.alpha;
        }
        ctx.check()?;
        let beta = solve_linear_system(gram, xc.t().dot(&yc))?;
        let intercept = y_mean - x_mean.dot(&beta);
        self.coef = Some((beta, intercept));
        Ok(())
    }

    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some((beta, intercept)) = &self.coef else {
            bail!("RidgeRegression is not fitted");
        };
        ensure_width(x, beta.len(), "RidgeRegression")?;
        let values = x.dot(beta) + *intercept;
        Ok(values.insert_axis(Axis(1)))
    }
}

// --- Logistic Regression ---
struct LogisticModel {
    mean: Array1<f64>,
    scale: Array1<f64>,
    weights: Array2<f64>,
    bias: Array1<f64>,
}

/// Multinomial logistic regression with L2 penalty `1 / C`, trained by full
/// batch gradient descent on internally standardised features.
pub struct LogisticRegression {
    c: f64,
    max_iter: usize,
    n_classes: usize,
    model: Option<LogisticModel>,
}

impl LogisticRegression {
    pub fn new(c: f64, max_iter: usize, n_classes: usize) -> Result<Self> {
        if c <= 0.0 {
            bail!("C must be positive");
        }
        Ok(Self {
            c,
            max_iter: max_iter.max(1),
            n_classes,
            model: None,
        })
    }

    fn softmax_rows(logits: &mut Array2<f64>) {
        for mut row in logits.axis_iter_mut(Axis(0)) {
            let max = row.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
    }
}

impl Estimator for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<()> {
        let Some(mean) = x.mean_axis(Axis(0)) else {
            bail!("LogisticRegression needs at least one sample");
        };
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        let xs = (x - &mean) / &scale;
        let n = xs.nrows() as f64;

        let classes = class_indices(y, self.n_classes)?;
        let mut onehot = Array2::zeros((xs.nrows(), self.n_classes));
        for (r, &c) in classes.iter().enumerate() {
            onehot[[r, c]] = 1.0;
        }

        let penalty = 1.0 / (self.c * n);
        let step = 1.0 / (0.5 * (xs.ncols() + 1) as f64 + penalty);
        let mut weights = Array2::<f64>::zeros((xs.ncols(), self.n_classes));
        let mut bias = Array1::<f64>::zeros(self.n_classes);

        for epoch in 0..self.max_iter {
            if epoch % 10 == 0 {
                ctx.check()?;
            }
            let mut proba = xs.dot(&weights) + &bias;
            Self::softmax_rows(&mut proba);
            let residual = proba - &onehot;
            let grad_w = xs.t().dot(&residual) / n + &weights * penalty;
            let Some(grad_b) = residual.mean_axis(Axis(0)) else {
                break;
            };
            weights.scaled_add(-step, &grad_w);
            bias.scaled_add(-step, &grad_b);

            let largest = grad_w
                .iter()
                .chain(grad_b.iter())
                .fold(0.0f64, |a, &g| a.max(g.abs()));
            if !largest.is_finite() {
                bail!("LogisticRegression diverged");
            }
            if largest < 1e-6 {
                break;
            }
        }

        self.model = Some(LogisticModel {
            mean,
            scale,
            weights,
            bias,
        });
        Ok(())
    }

    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some(model) = &self.model else {
            bail!("LogisticRegression is not fitted");
        };
        ensure_width(x, model.mean.len(), "LogisticRegression")?;
        let xs = (x - &model.mean) / &model.scale;
        let mut proba = xs.dot(&model.weights) + &model.bias;
        Self::softmax_rows(&mut proba);
        Ok(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_solve_linear_system() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![3.0, 5.0];
        let x = solve_linear_system(a, b).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_singular_system_fails() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(solve_linear_system(a, array![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_ridge_recovers_linear_relation() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let mut ridge = RidgeRegression::new(1e-9).unwrap();
        ridge.fit(&x, &y, &FitContext::unbounded()).unwrap();
        let out = ridge.predict_output(&array![[4.0]]).unwrap();
        assert!((out[[0, 0]] - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_logistic_regression_learns_threshold() {
        let x = array![[-2.0], [-1.5], [-1.0], [1.0], [1.5], [2.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = LogisticRegression::new(10.0, 500, 2).unwrap();
        model.fit(&x, &y, &FitContext::unbounded()).unwrap();
        let proba = model.predict_output(&array![[-3.0], [3.0]]).unwrap();
        assert!(proba[[0, 0]] > 0.9);
        assert!(proba[[1, 1]] > 0.9);
    }
}
