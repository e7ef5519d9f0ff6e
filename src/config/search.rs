use super::traits::{check_duration, invalid, ConfigSection};
use crate::engines::generation::hall_of_fame::TieBreak;
use crate::engines::generation::operators::MutationKind;
use crate::error::AutopipeError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Wall-clock budget for the whole `fit` call
    pub max_total_time_secs: f64,
    pub population_size: usize,
    pub offspring_size: usize,
    /// Stop after this many generations even if time remains
    pub max_generations: Option<usize>,
    /// Maximum number of stages (primitives) in a pipeline
    pub max_pipeline_length: usize,
    pub crossover_probability: f64,
    pub mutation_weights: MutationWeights,
    pub tie_break: TieBreak,
    pub hall_of_fame_size: usize,
}

/// Relative weights of the mutation kinds; zero disables a kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationWeights {
    pub replace_terminal: f64,
    pub replace_primitive: f64,
    pub insert: f64,
    pub shrink: f64,
}

impl MutationWeights {
    pub fn weight(&self, kind: MutationKind) -> f64 {
        match kind {
            MutationKind::ReplaceTerminal => self.replace_terminal,
            MutationKind::ReplacePrimitive => self.replace_primitive,
            MutationKind::Insert => self.insert,
            MutationKind::Shrink => self.shrink,
        }
    }
}

impl Default for MutationWeights {
    fn default() -> Self {
        Self {
            replace_terminal: 1.0,
            replace_primitive: 1.0,
            insert: 1.0,
            shrink: 1.0,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_total_time_secs: 60.0,
            population_size: 50,
            offspring_size: 50,
            max_generations: None,
            max_pipeline_length: 3,
            crossover_probability: 0.2,
            mutation_weights: MutationWeights::default(),
            tie_break: TieBreak::default(),
            hall_of_fame_size: 100,
        }
    }
}

impl SearchConfig {
    pub fn max_total_time(&self) -> Duration {
        Duration::from_secs_f64(self.max_total_time_secs)
    }
}

impl ConfigSection for SearchConfig {
    fn section_name() -> &'static str {
        "search"
    }

    fn validate(&self) -> Result<(), AutopipeError> {
        let section = Self::section_name();
        check_duration(section, "max_total_time_secs", self.max_total_time_secs)?;
        if self.population_size == 0 || self.offspring_size == 0 {
            return Err(invalid(section, "population_size and offspring_size must be positive"));
        }
        if self.max_generations == Some(0) {
            return Err(invalid(section, "max_generations must be positive when set"));
        }
        if self.max_pipeline_length == 0 {
            return Err(invalid(section, "max_pipeline_length must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.crossover_probability) {
            return Err(invalid(section, "crossover_probability must be between 0 and 1"));
        }
        let weights = MutationKind::ALL.map(|k| self.mutation_weights.weight(k));
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid(section, "mutation weights must be finite and non-negative"));
        }
        if weights.iter().all(|w| *w == 0.0) {
            return Err(invalid(section, "at least one mutation weight must be positive"));
        }
        if self.hall_of_fame_size == 0 {
            return Err(invalid(section, "hall_of_fame_size must be positive"));
        }
        Ok(())
    }
}
