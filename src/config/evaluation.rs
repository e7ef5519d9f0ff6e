use super::traits::{check_duration, invalid, ConfigSection};
use crate::engines::metrics::Metric;
use crate::error::AutopipeError;
use crate::types::Task;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Metric name; the task default when unset
    pub metric: Option<String>,
    pub cv_folds: usize,
    /// Per-individual time slice
    pub max_eval_time_secs: Option<f64>,
    /// Worker threads; 0 uses every core
    pub n_jobs: usize,
    pub random_state: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            metric: None,
            cv_folds: 5,
            max_eval_time_secs: None,
            n_jobs: 1,
            random_state: 0,
        }
    }
}

impl EvaluationConfig {
    /// Resolves the configured metric and checks it suits `task`.
    pub fn metric_for(&self, task: Task) -> Result<Metric, AutopipeError> {
        let metric = match &self.metric {
            Some(name) => Metric::from_name(name)?,
            None => Metric::default_for(task),
        };
        if metric.task() != task {
            return Err(invalid(
                Self::section_name(),
                format!("metric '{}' does not apply to {}", metric, task),
            ));
        }
        Ok(metric)
    }

    pub fn max_eval_time(&self) -> Option<Duration> {
        self.max_eval_time_secs.map(Duration::from_secs_f64)
    }
}

impl ConfigSection for EvaluationConfig {
    fn section_name() -> &'static str {
        "evaluation"
    }

    fn validate(&self) -> Result<(), AutopipeError> {
        let section = Self::section_name();
        if let Some(name) = &self.metric {
            Metric::from_name(name)?;
        }
        if self.cv_folds < 2 {
            return Err(invalid(section, "cv_folds must be at least 2"));
        }
        if let Some(slice) = self.max_eval_time_secs {
            check_duration(section, "max_eval_time_secs", slice)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_resolution() {
        let config = EvaluationConfig::default();
        assert_eq!(config.metric_for(Task::Regression).unwrap(), Metric::MeanSquaredError);

        let config = EvaluationConfig {
            metric: Some("accuracy".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.metric_for(Task::Regression).is_err());
    }

    #[test]
    fn test_rejects_unknown_metric() {
        let config = EvaluationConfig {
            metric: Some("bogus".into()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AutopipeError::Configuration(_))));
    }

    #[test]
    fn test_eval_slice_bounds() {
        for secs in [0.0, -1.0, f64::NAN, 1e20] {
            let config = EvaluationConfig {
                max_eval_time_secs: Some(secs),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{} accepted", secs);
        }
        let config = EvaluationConfig {
            max_eval_time_secs: Some(2.5),
            ..Default::default()
        };
        assert_eq!(config.max_eval_time(), Some(Duration::from_millis(2500)));
    }
}
