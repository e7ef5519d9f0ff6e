use super::traits::{class_indices, ensure_width, FitContext, Transformer};
use crate::types::Task;
use anyhow::{bail, Result};
use ndarray::{Array1, Array2, Axis};

// --- Standard Scaler ---
#[derive(Debug, Default)]
pub struct StandardScaler {
    stats: Option<(Array1<f64>, Array1<f64>)>,
}

impl Transformer for StandardScaler {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>, _ctx: &FitContext) -> Result<()> {
        let Some(mean) = x.mean_axis(Axis(0)) else {
            bail!("StandardScaler needs at least one sample");
        };
        let std = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        self.stats = Some((mean, std));
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some((mean, std)) = &self.stats else {
            bail!("StandardScaler is not fitted");
        };
        ensure_width(x, mean.len(), "StandardScaler")?;
        Ok((x - mean) / std)
    }
}

// --- Min-Max Scaler ---
#[derive(Debug, Default)]
pub struct MinMaxScaler {
    bounds: Option<(Array1<f64>, Array1<f64>)>,
}

impl Transformer for MinMaxScaler {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>, _ctx: &FitContext) -> Result<()> {
        if x.nrows() == 0 {
            bail!("MinMaxScaler needs at least one sample");
        }
        let min = x.fold_axis(Axis(0), f64::INFINITY, |&acc, &v| acc.min(v));
        let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &v| acc.max(v));
        let range = (&max - &min).mapv(|r| if r > 0.0 && r.is_finite() { r } else { 1.0 });
        self.bounds = Some((min, range));
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some((min, range)) = &self.bounds else {
            bail!("MinMaxScaler is not fitted");
        };
        ensure_width(x, min.len(), "MinMaxScaler")?;
        Ok((x - min) / range)
    }
}

// --- Normalizer ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Norm {
    L1,
    L2,
    Max,
}

/// Row-wise rescaling to unit norm. Stateless.
#[derive(Debug)]
pub struct Normalizer {
    norm: Norm,
}

impl Normalizer {
    pub fn new(norm: &str) -> Result<Self> {
        let norm = match norm {
            "l1" => Norm::L1,
            "l2" => Norm::L2,
            "max" => Norm::Max,
            other => bail!("unknown norm '{}'", other),
        };
        Ok(Self { norm })
    }
}

impl Transformer for Normalizer {
    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>, _ctx: &FitContext) -> Result<()> {
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut out = x.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            let norm = match self.norm {
                Norm::L1 => row.iter().map(|v| v.abs()).sum::<f64>(),
                Norm::L2 => row.iter().map(|v| v * v).sum::<f64>().sqrt(),
                Norm::Max => row.iter().fold(0.0f64, |acc, v| acc.max(v.abs())),
            };
            if norm > 0.0 {
                row.mapv_inplace(|v| v / norm);
            }
        }
        Ok(out)
    }
}

// --- Variance Threshold ---
#[derive(Debug)]
pub struct VarianceThreshold {
    threshold: f64,
    keep: Option<(usize, Vec<usize>)>,
}

impl VarianceThreshold {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            keep: None,
        }
    }
}

impl Transformer for VarianceThreshold {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>, _ctx: &FitContext) -> Result<()> {
        let variance = x.var_axis(Axis(0), 0.0);
        let keep: Vec<usize> = variance
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > self.threshold)
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() {
            bail!("no feature has variance above {}", self.threshold);
        }
        self.keep = Some((x.ncols(), keep));
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some((width, keep)) = &self.keep else {
            bail!("VarianceThreshold is not fitted");
        };
        ensure_width(x, *width, "VarianceThreshold")?;
        Ok(x.select(Axis(1), keep))
    }
}

// --- Polynomial Features (degree 2, no bias) ---
#[derive(Debug)]
pub struct PolynomialFeatures {
    interaction_only: bool,
    width: Option<usize>,
}

impl PolynomialFeatures {
    pub fn new(interaction_only: bool) -> Self {
        Self {
            interaction_only,
            width: None,
        }
    }

    fn pairs(&self, width: usize) -> Vec<(usize, usize)> {
        let offset = usize::from(self.interaction_only);
        (0..width)
            .flat_map(|i| (i + offset..width).map(move |j| (i, j)))
            .collect()
    }
}

impl Transformer for PolynomialFeatures {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>, _ctx: &FitContext) -> Result<()> {
        self.width = Some(x.ncols());
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some(width) = self.width else {
            bail!("PolynomialFeatures is not fitted");
        };
        ensure_width(x, width, "PolynomialFeatures")?;
        let pairs = self.pairs(width);
        let mut out = Array2::zeros((x.nrows(), width + pairs.len()));
        for (r, row) in x.axis_iter(Axis(0)).enumerate() {
            for c in 0..width {
                out[[r, c]] = row[c];
            }
            for (k, &(i, j)) in pairs.iter().enumerate() {
                out[[r, width + k]] = row[i] * row[j];
            }
        }
        Ok(out)
    }
}

// --- Select Percentile ---
/// Keeps the best scoring `percentile` percent of features: ANOVA F for
/// classification, absolute Pearson correlation for regression.
#[derive(Debug)]
pub struct SelectPercentile {
    percentile: usize,
    task: Task,
    keep: Option<(usize, Vec<usize>)>,
}

impl SelectPercentile {
    pub fn new(percentile: usize, task: Task) -> Self {
        Self {
            percentile: percentile.clamp(1, 100),
            task,
            keep: None,
        }
    }

    fn f_statistic(column: &[f64], classes: &[usize]) -> f64 {
        let n = column.len() as f64;
        let n_groups = classes.iter().copied().max().map_or(0, |m| m + 1);
        let mut sums = vec![0.0; n_groups];
        let mut counts = vec![0.0; n_groups];
        for (&v, &c) in column.iter().zip(classes) {
            sums[c] += v;
            counts[c] += 1.0;
        }
        let mean = column.iter().sum::<f64>() / n;
        let present = counts.iter().filter(|&&c| c > 0.0).count() as f64;
        if present < 2.0 || n <= present {
            return 0.0;
        }
        let between: f64 = sums
            .iter()
            .zip(&counts)
            .filter(|(_, &c)| c > 0.0)
            .map(|(s, c)| c * (s / c - mean).powi(2))
            .sum();
        let within: f64 = column
            .iter()
            .zip(classes)
            .map(|(&v, &c)| (v - sums[c] / counts[c]).powi(2))
            .sum();
        if within <= 0.0 {
            return if between > 0.0 { f64::INFINITY } else { 0.0 };
        }
        (between / (present - 1.0)) / (within / (n - present))
    }

    fn abs_correlation(column: &[f64], target: &[f64]) -> f64 {
        let n = column.len() as f64;
        let mx = column.iter().sum::<f64>() / n;
        let my = target.iter().sum::<f64>() / n;
        let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
        for (&a, &b) in column.iter().zip(target) {
            sxy += (a - mx) * (b - my);
            sxx += (a - mx).powi(2);
            syy += (b - my).powi(2);
        }
        if sxx <= 0.0 || syy <= 0.0 {
            return 0.0;
        }
        (sxy / (sxx.sqrt() * syy.sqrt())).abs()
    }
}

impl Transformer for SelectPercentile {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, _ctx: &FitContext) -> Result<()> {
        if x.nrows() == 0 {
            bail!("SelectPercentile needs at least one sample");
        }
        let target: Vec<f64> = y.to_vec();
        let classes = match self.task {
            Task::Classification => {
                let n_classes = target.iter().fold(0.0f64, |a, &b| a.max(b)) as usize + 1;
                Some(class_indices(y, n_classes)?)
            }
            Task::Regression => None,
        };

        let mut scores: Vec<(usize, f64)> = x
            .axis_iter(Axis(1))
            .enumerate()
            .map(|(j, column)| {
                let column = column.to_vec();
                let score = match &classes {
                    Some(classes) => Self::f_statistic(&column, classes),
                    None => Self::abs_correlation(&column, &target),
                };
                (j, if score.is_nan() { 0.0 } else { score })
            })
            .collect();

        let count = ((x.ncols() * self.percentile) as f64 / 100.0).ceil().max(1.0) as usize;
        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let mut keep: Vec<usize> = scores.iter().take(count).map(|(j, _)| *j).collect();
        keep.sort_unstable();
        self.keep = Some((x.ncols(), keep));
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some((width, keep)) = &self.keep else {
            bail!("SelectPercentile is not fitted");
        };
        ensure_width(x, *width, "SelectPercentile")?;
        Ok(x.select(Axis(1), keep))
    }
}

// --- Feature Agglomeration ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Ward,
    Complete,
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Euclidean,
    Manhattan,
    Cosine,
}

/// Agglomerative clustering of features into two groups, each replaced by
/// the mean of its members.
#[derive(Debug)]
pub struct FeatureAgglomeration {
    linkage: Linkage,
    affinity: Affinity,
    n_clusters: usize,
    clusters: Option<(usize, Vec<Vec<usize>>)>,
}

impl FeatureAgglomeration {
    pub fn new(linkage: &str, affinity: &str) -> Result<Self> {
        let linkage = match linkage {
            "ward" => Linkage::Ward,
            "complete" => Linkage::Complete,
            "average" => Linkage::Average,
            other => bail!("unknown linkage '{}'", other),
        };
        let affinity = match affinity {
            "euclidean" | "l2" => Affinity::Euclidean,
            "manhattan" | "l1" => Affinity::Manhattan,
            "cosine" => Affinity::Cosine,
            other => bail!("unknown affinity '{}'", other),
        };
        Ok(Self {
            linkage,
            affinity,
            n_clusters: 2,
            clusters: None,
        })
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self.affinity {
            Affinity::Euclidean => a
                .iter()
                .zip(b)
                .map(|(p, q)| (p - q).powi(2))
                .sum::<f64>()
                .sqrt(),
            Affinity::Manhattan => a.iter().zip(b).map(|(p, q)| (p - q).abs()).sum(),
            Affinity::Cosine => {
                let dot: f64 = a.iter().zip(b).map(|(p, q)| p * q).sum();
                let na = a.iter().map(|p| p * p).sum::<f64>().sqrt();
                let nb = b.iter().map(|q| q * q).sum::<f64>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (na * nb)
                }
            }
        }
    }

    fn merged_distance(&self, d_ik: f64, d_jk: f64, d_ij: f64, ni: f64, nj: f64, nk: f64) -> f64 {
        match self.linkage {
            Linkage::Complete => d_ik.max(d_jk),
            Linkage::Average => (ni * d_ik + nj * d_jk) / (ni + nj),
            Linkage::Ward => (((ni + nk) * d_ik.powi(2) + (nj + nk) * d_jk.powi(2)
                - nk * d_ij.powi(2))
                / (ni + nj + nk))
                .max(0.0)
                .sqrt(),
        }
    }
}

impl Transformer for FeatureAgglomeration {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>, ctx: &FitContext) -> Result<()> {
        if self.linkage == Linkage::Ward && self.affinity != Affinity::Euclidean {
            bail!("ward linkage only accepts euclidean affinity");
        }
        let width = x.ncols();
        let mut clusters: Vec<Vec<usize>> = (0..width).map(|j| vec![j]).collect();
        if width <= self.n_clusters {
            self.clusters = Some((width, clusters));
            return Ok(());
        }

        let columns: Vec<Vec<f64>> = x.axis_iter(Axis(1)).map(|c| c.to_vec()).collect();
        let mut dist = vec![vec![0.0; width]; width];
        for i in 0..width {
            for j in (i + 1)..width {
                let d = self.distance(&columns[i], &columns[j]);
                dist[i][j] = d;
                dist[j][i] = d;
            }
        }

        let mut active: Vec<usize> = (0..width).collect();
        while active.len() > self.n_clusters {
            ctx.check()?;
            let mut best = (0, 1, f64::INFINITY);
            for (a, &i) in active.iter().enumerate() {
                for &j in &active[a + 1..] {
                    if dist[i][j] < best.2 {
                        best = (i, j, dist[i][j]);
                    }
                }
            }
            let (i, j, d_ij) = best;
            let (ni, nj) = (clusters[i].len() as f64, clusters[j].len() as f64);
            for &k in &active {
                if k == i || k == j {
                    continue;
                }
                let nk = clusters[k].len() as f64;
                let d = self.merged_distance(dist[i][k], dist[j][k], d_ij, ni, nj, nk);
                dist[i][k] = d;
                dist[k][i] = d;
            }
            let absorbed = std::mem::take(&mut clusters[j]);
            clusters[i].extend(absorbed);
            active.retain(|&k| k != j);
        }

        let mut groups: Vec<Vec<usize>> = active
            .into_iter()
            .map(|i| {
                let mut members = std::mem::take(&mut clusters[i]);
                members.sort_unstable();
                members
            })
            .collect();
        groups.sort_by_key(|g| g[0]);
        self.clusters = Some((width, groups));
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let Some((width, groups)) = &self.clusters else {
            bail!("FeatureAgglomeration is not fitted");
        };
        ensure_width(x, *width, "FeatureAgglomeration")?;
        let mut out = Array2::zeros((x.nrows(), groups.len()));
        for (g, members) in groups.iter().enumerate() {
            let pooled = x.select(Axis(1), members).mean_axis(Axis(1));
            if let Some(pooled) = pooled {
                out.column_mut(g).assign(&pooled);
            }
        }
        Ok(out)
    }
}
