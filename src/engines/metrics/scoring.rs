// src/engines/metrics/scoring.rs
use crate::engines::generation::pareto::OptimizationDirection;
use crate::error::{AutopipeError, Result};
use crate::functions::traits::collapse_output;
use crate::types::Task;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

const PROBA_EPS: f64 = 1e-15;

/// Scoring functions the search can optimise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    BalancedAccuracy,
    F1Macro,
    LogLoss,
    MeanSquaredError,
    MeanAbsoluteError,
    RootMeanSquaredError,
    R2,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::Accuracy,
        Metric::BalancedAccuracy,
        Metric::F1Macro,
        Metric::LogLoss,
        Metric::MeanSquaredError,
        Metric::MeanAbsoluteError,
        Metric::RootMeanSquaredError,
        Metric::R2,
    ];

    /// Resolves a metric name. A `neg_` prefix is accepted and ignored, since
    /// scores are oriented internally anyway.
    pub fn from_name(name: &str) -> Result<Self> {
        let bare = name.trim().strip_prefix("neg_").unwrap_or(name.trim());
        Self::ALL
            .into_iter()
            .find(|m| m.name() == bare)
            .ok_or_else(|| AutopipeError::Configuration(format!("unknown metric '{}'", name)))
    }

    pub fn default_for(task: Task) -> Self {
        match task {
            Task::Classification => Metric::LogLoss,
            Task::Regression => Metric::MeanSquaredError,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::BalancedAccuracy => "balanced_accuracy",
            Metric::F1Macro => "f1_macro",
            Metric::LogLoss => "log_loss",
            Metric::MeanSquaredError => "mean_squared_error",
            Metric::MeanAbsoluteError => "mean_absolute_error",
            Metric::RootMeanSquaredError => "root_mean_squared_error",
            Metric::R2 => "r2",
        }
    }

    pub fn task(&self) -> Task {
        match self {
            Metric::Accuracy | Metric::BalancedAccuracy | Metric::F1Macro | Metric::LogLoss => {
                Task::Classification
            }
            _ => Task::Regression,
        }
    }

    pub fn direction(&self) -> OptimizationDirection {
        match self {
            Metric::Accuracy | Metric::BalancedAccuracy | Metric::F1Macro | Metric::R2 => {
                OptimizationDirection::Maximize
            }
            _ => OptimizationDirection::Minimize,
        }
    }

    /// Whether the metric reads class probabilities rather than labels
    pub fn requires_proba(&self) -> bool {
        matches!(self, Metric::LogLoss)
    }

    /// Raw metric value of estimator output against encoded targets.
    /// Classification output holds one probability column per class,
    /// regression output a single column.
    pub fn score(&self, y_true: &Array1<f64>, output: &Array2<f64>) -> f64 {
        if y_true.is_empty() || y_true.len() != output.nrows() {
            return f64::NAN;
        }
        match self {
            Metric::LogLoss => log_loss(y_true, output),
            Metric::Accuracy | Metric::BalancedAccuracy | Metric::F1Macro => {
                let y_pred = collapse_output(Task::Classification, output);
                let n_classes = output.ncols();
                match self {
                    Metric::Accuracy => accuracy(y_true, &y_pred),
                    Metric::BalancedAccuracy => balanced_accuracy(y_true, &y_pred, n_classes),
                    _ => f1_macro(y_true, &y_pred, n_classes),
                }
            }
            regression => {
                let y_pred = output.column(0);
                let residuals = y_true - &y_pred;
                let n = y_true.len() as f64;
                match regression {
                    Metric::MeanSquaredError => residuals.mapv(|r| r * r).sum() / n,
                    Metric::MeanAbsoluteError => residuals.mapv(f64::abs).sum() / n,
                    Metric::RootMeanSquaredError => (residuals.mapv(|r| r * r).sum() / n).sqrt(),
                    _ => r2(y_true, &residuals),
                }
            }
        }
    }

    /// Score oriented so that larger is always better
    pub fn oriented_score(&self, y_true: &Array1<f64>, output: &Array2<f64>) -> f64 {
        let raw = self.score(y_true, output);
        match self.direction() {
            OptimizationDirection::Maximize => raw,
            OptimizationDirection::Minimize => -raw,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    hits as f64 / y_true.len() as f64
}

/// Per-class (true positives, actual count, predicted count)
fn class_counts(y_true: &Array1<f64>, y_pred: &Array1<f64>, n_classes: usize) -> Vec<(f64, f64, f64)> {
    let mut counts = vec![(0.0, 0.0, 0.0); n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        let (t, p) = (t as usize, p as usize);
        if t < n_classes {
            counts[t].1 += 1.0;
            if t == p {
                counts[t].0 += 1.0;
            }
        }
        if p < n_classes {
            counts[p].2 += 1.0;
        }
    }
    counts
}

fn balanced_accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>, n_classes: usize) -> f64 {
    let recalls: Vec<f64> = class_counts(y_true, y_pred, n_classes)
        .into_iter()
        .filter(|(_, actual, _)| *actual > 0.0)
        .map(|(tp, actual, _)| tp / actual)
        .collect();
    if recalls.is_empty() {
        return 0.0;
    }
    recalls.iter().sum::<f64>() / recalls.len() as f64
}

fn f1_macro(y_true: &Array1<f64>, y_pred: &Array1<f64>, n_classes: usize) -> f64 {
    let scores: Vec<f64> = class_counts(y_true, y_pred, n_classes)
        .into_iter()
        .filter(|(_, actual, predicted)| *actual > 0.0 || *predicted > 0.0)
        .map(|(tp, actual, predicted)| 2.0 * tp / (actual + predicted))
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn log_loss(y_true: &Array1<f64>, proba: &Array2<f64>) -> f64 {
    let mut total = 0.0;
    for (row, &label) in proba.axis_iter(Axis(0)).zip(y_true) {
        let class = label as usize;
        if class >= row.len() {
            return f64::NAN;
        }
        let norm: f64 = row.iter().map(|p| p.clamp(PROBA_EPS, 1.0 - PROBA_EPS)).sum();
        let p = row[class].clamp(PROBA_EPS, 1.0 - PROBA_EPS) / norm;
        total -= p.ln();
    }
    total / y_true.len() as f64
}

fn r2(y_true: &Array1<f64>, residuals: &Array1<f64>) -> f64 {
    let mean = y_true.sum() / y_true.len() as f64;
    let total: f64 = y_true.iter().map(|v| (v - mean).powi(2)).sum();
    let residual: f64 = residuals.iter().map(|r| r * r).sum();
    if total == 0.0 {
        return if residual == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - residual / total
}
