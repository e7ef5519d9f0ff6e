use super::traits::{class_indices, ensure_width, Estimator, FitContext};
use anyhow::{bail, Result};
use ndarray::{Array1, Array2, Axis};

struct NbModel {
    log_prior: Vec<f64>,
    means: Array2<f64>,
    variances: Array2<f64>,
}

/// Gaussian naive Bayes with variance smoothing relative to the widest feature.
pub struct GaussianNB {
    n_classes: usize,
    model: Option<NbModel>,
}

impl GaussianNB {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            model: None,
        }
    }
}

impl Estimator for GaussianNB {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, _ctx: &FitContext) -> Result<()> {
        if x.nrows() == 0 {
            bail!("GaussianNB needs at least one sample");
        }
        let classes = class_indices(y, self.n_classes)?;
        let width = x.ncols();
        let smoothing = 1e-9
            * x.var_axis(Axis(0), 0.0)
                .iter()
                .fold(0.0f64, |a, &b| a.max(b))
                .max(1.0);

        let mut counts = vec![0.0; self.n_classes];
        let mut means = Array2::zeros((self.n_classes, width));
        let mut variances = Array2::zeros((self.n_classes, width));
        for (row, &c) in x.axis_iter(Axis(0)).zip(&classes) {
            counts[c] += 1.0;
            let mut mean = means.row_mut(c);
            mean += &row;
        }
        for c in 0..self.n_classes {
            if counts[c] > 0.0 {
                means.row_mut(c).mapv_inplace(|v| v / counts[c]);
            }
        }
        for (row, &c) in x.axis_iter(Axis(0)).zip(&classes) {
            let diff = &row - &means.row(c);
            let mut var = variances.row_mut(c);
            var += &diff.mapv(|d| d * d);
        }
        for c in 0..self.n_classes {
            let n = counts[c].max(1.0);
            variances.row_mut(c).mapv_inplace(|v| v / n + smoothing);
        }

        let total = classes.len() as f64;
        let log_prior = counts
            .iter()
            .map(|&n| if n > 0.0 { (n / total).ln() } else { f64::NEG_INFINITY })
            .collect();

        self.model = Some(NbModel {
            log_prior,
            means,
            variances,
        });
        Ok(())
    }

    fn predict_output(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some(model) = &self.model else {
            bail!("GaussianNB is not fitted");
        };
        ensure_width(x, model.means.ncols(), "GaussianNB")?;

        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (r, row) in x.axis_iter(Axis(0)).enumerate() {
            let joint: Vec<f64> = (0..self.n_classes)
                .map(|c| {
                    if model.log_prior[c] == f64::NEG_INFINITY {
                        return f64::NEG_INFINITY;
                    }
                    let ll: f64 = row
                        .iter()
                        .zip(model.means.row(c))
                        .zip(model.variances.row(c))
                        .map(|((&v, &m), &s)| {
                            (2.0 * std::f64::consts::PI * s).ln() + (v - m).powi(2) / s
                        })
                        .sum();
                    model.log_prior[c] - 0.5 * ll
                })
                .collect();
            let max = joint.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let norm: f64 = joint.iter().map(|&j| (j - max).exp()).sum();
            for (c, &j) in joint.iter().enumerate() {
                out[[r, c]] = (j - max).exp() / norm;
            }
        }
        Ok(out)
    }
}
