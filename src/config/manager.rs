use super::{
    catalog::CatalogConfig, ensemble::EnsembleConfig, evaluation::EvaluationConfig,
    search::SearchConfig, traits::ConfigSection,
};
use crate::error::AutopipeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub evaluation: EvaluationConfig,
    pub ensemble: EnsembleConfig,
    pub catalog: CatalogConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), AutopipeError> {
        self.search.validate()?;
        self.evaluation.validate()?;
        self.ensemble.validate()?;
        self.catalog.validate()?;
        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, AutopipeError> {
        let config: AppConfig = toml::from_str(contents)
            .map_err(|e| AutopipeError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

fn poisoned<T>(_: T) -> AutopipeError {
    AutopipeError::Configuration("configuration lock poisoned".to_string())
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), AutopipeError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AutopipeError::Configuration(format!("Failed to read config: {}", e)))?;

        let config = AppConfig::from_toml_str(&contents)?;

        *self.config.write().map_err(poisoned)? = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), AutopipeError> {
        let config = self.config.read().map_err(poisoned)?;
        let toml_str = toml::to_string_pretty(&*config)
            .map_err(|e| AutopipeError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| AutopipeError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> Result<AppConfig, AutopipeError> {
        Ok(self.config.read().map_err(poisoned)?.clone())
    }

    /// Applies `f` and keeps the result only if it validates.
    pub fn update<F>(&self, f: F) -> Result<(), AutopipeError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.config.write().map_err(poisoned)?;
        let mut candidate = config.clone();
        f(&mut candidate);
        candidate.validate()?;
        *config = candidate;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
