use super::traits::{invalid, ConfigSection};
use crate::error::AutopipeError;
use serde::{Deserialize, Serialize};

/// How ensemble member weights are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    #[default]
    Uniform,
    /// Forward selection with replacement over out-of-fold predictions
    Greedy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub auto_ensemble_n: usize,
    pub weighting: Weighting,
    /// Share of the total budget reserved for building the ensemble
    pub post_processing_fraction: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            auto_ensemble_n: 5,
            weighting: Weighting::Uniform,
            post_processing_fraction: 0.1,
        }
    }
}

impl ConfigSection for EnsembleConfig {
    fn section_name() -> &'static str {
        "ensemble"
    }

    fn validate(&self) -> Result<(), AutopipeError> {
        let section = Self::section_name();
        if self.auto_ensemble_n == 0 {
            return Err(invalid(section, "auto_ensemble_n must be at least 1"));
        }
        if !(self.post_processing_fraction > 0.0 && self.post_processing_fraction < 1.0) {
            return Err(invalid(section, "post_processing_fraction must be in (0, 1)"));
        }
        Ok(())
    }
}
