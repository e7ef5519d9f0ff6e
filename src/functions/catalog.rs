use super::registry::{ComponentKind, ComponentRegistry, ComponentSpec};
use crate::config::catalog::has_repeated_value;
use crate::config::CatalogConfig;
use crate::error::{AutopipeError, Result};
use crate::types::{SlotType, Task, Value};
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Typed pipeline stage: `data` first, then one slot per hyperparameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveDef {
    pub name: String,
    pub kind: ComponentKind,
    pub inputs: Vec<SlotType>,
    pub output: SlotType,
}

impl PrimitiveDef {
    pub fn arity(&self) -> usize {
        self.inputs.len()
    }

    /// Hyperparameter slots, in declaration order
    pub fn hyper_inputs(&self) -> &[SlotType] {
        &self.inputs[1..]
    }
}

/// A concrete value bound to one hyperparameter slot
#[derive(Debug, Clone, PartialEq)]
pub struct Terminal {
    pub slot: SlotType,
    pub value: Value,
}

impl Terminal {
    /// Parameter name without the owner prefix
    pub fn param(&self) -> &str {
        match &self.slot {
            SlotType::Hyper(key) => key.rsplit('.').next().unwrap_or(key),
            _ => "",
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.slot, self.value)
    }
}

/// Read-only table of the primitives and terminals available to one search,
/// built once from the component registry.
pub struct Catalog {
    task: Task,
    registry: ComponentRegistry,
    primitives: Vec<Arc<PrimitiveDef>>,
    terminals: BTreeMap<SlotType, Vec<Terminal>>,
}

impl Catalog {
    pub fn from_registry(registry: ComponentRegistry, task: Task, config: &CatalogConfig) -> Result<Self> {
        for name in config.components.iter().flatten().chain(&config.exclude) {
            if registry.get(name).is_none() {
                return Err(AutopipeError::Configuration(format!(
                    "unknown component '{}' in catalog configuration",
                    name
                )));
            }
        }
        for (key, values) in &config.params {
            let known = key.split_once('.').is_some_and(|(owner, param)| {
                registry
                    .get(owner)
                    .is_some_and(|spec| spec.params.iter().any(|p| p.name == param))
            });
            if !known {
                return Err(AutopipeError::Configuration(format!(
                    "unknown hyperparameter '{}' in catalog configuration",
                    key
                )));
            }
            if values.is_empty() {
                return Err(AutopipeError::Configuration(format!(
                    "hyperparameter '{}' has an empty domain",
                    key
                )));
            }
            if has_repeated_value(values) {
                return Err(AutopipeError::Configuration(format!(
                    "hyperparameter '{}' lists the same value more than once",
                    key
                )));
            }
        }

        let selected = |spec: &ComponentSpec| {
            config
                .components
                .as_ref()
                .map_or(true, |names| names.iter().any(|n| n == spec.name))
                && !config.exclude.iter().any(|n| n == spec.name)
        };

        let mut primitives = Vec::new();
        let mut terminals: BTreeMap<SlotType, Vec<Terminal>> = BTreeMap::new();
        for spec in registry.for_task(task).filter(|s| selected(s)) {
            let mut inputs = vec![SlotType::Data];
            for param in &spec.params {
                let slot = SlotType::hyper(spec.name, param.name);
                let values = config.params.get(&slot.to_string()).unwrap_or(&param.values);
                terminals.insert(
                    slot.clone(),
                    values
                        .iter()
                        .map(|value| Terminal {
                            slot: slot.clone(),
                            value: value.clone(),
                        })
                        .collect(),
                );
                inputs.push(slot);
            }
            primitives.push(Arc::new(PrimitiveDef {
                name: spec.name.to_string(),
                kind: spec.kind,
                inputs,
                output: spec.kind.output_type(),
            }));
        }

        if !primitives.iter().any(|p| p.output == SlotType::Prediction) {
            return Err(AutopipeError::Configuration(format!(
                "catalog has no {} estimator left after filtering",
                task
            )));
        }
        debug!(
            "catalog for {}: {} primitives, {} hyperparameter slots",
            task,
            primitives.len(),
            terminals.len()
        );

        Ok(Self {
            task,
            registry,
            primitives,
            terminals,
        })
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn primitives(&self) -> &[Arc<PrimitiveDef>] {
        &self.primitives
    }

    /// Primitives producing `output`, in registration order
    pub fn primitives_for(&self, output: &SlotType) -> Vec<&Arc<PrimitiveDef>> {
        self.primitives.iter().filter(|p| &p.output == output).collect()
    }

    pub fn primitive(&self, name: &str) -> Option<&Arc<PrimitiveDef>> {
        self.primitives.iter().find(|p| p.name == name)
    }

    pub fn terminals_for(&self, slot: &SlotType) -> &[Terminal] {
        self.terminals.get(slot).map_or(&[], Vec::as_slice)
    }

    /// Registry entry of a primitive that is part of this catalog
    pub fn component(&self, name: &str) -> Option<&ComponentSpec> {
        self.primitive(name).and_then(|_| self.registry.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(task: Task, config: &CatalogConfig) -> Result<Catalog> {
        Catalog::from_registry(ComponentRegistry::new(), task, config)
    }

    #[test]
    fn test_primitive_typing() {
        let catalog = catalog(Task::Classification, &CatalogConfig::default()).unwrap();
        let fa = catalog.primitive("FeatureAgglomeration").unwrap();
        assert_eq!(fa.output, SlotType::Data);
        assert_eq!(
            fa.inputs,
            vec![
                SlotType::Data,
                SlotType::hyper("FeatureAgglomeration", "linkage"),
                SlotType::hyper("FeatureAgglomeration", "affinity"),
            ]
        );
        assert!(catalog.primitive("RidgeRegression").is_none());
        assert!(catalog
            .primitives_for(&SlotType::Prediction)
            .iter()
            .all(|p| p.kind == ComponentKind::Classifier));
    }

    #[test]
    fn test_terminal_rendering() {
        let catalog = catalog(Task::Classification, &CatalogConfig::default()).unwrap();
        let linkage = catalog.terminals_for(&SlotType::hyper("FeatureAgglomeration", "linkage"));
        assert_eq!(linkage[1].to_string(), "FeatureAgglomeration.linkage='complete'");
        assert_eq!(linkage[1].param(), "linkage");
    }

    #[test]
    fn test_param_override_and_filters() {
        let mut config = CatalogConfig::default();
        config.components = Some(vec!["StandardScaler".into(), "RandomForestRegressor".into()]);
        config
            .params
            .insert("RandomForestRegressor.n_estimators".into(), vec![Value::Integer(10)]);
        let catalog = catalog(Task::Regression, &config).unwrap();
        assert_eq!(catalog.primitives().len(), 2);
        let slot = SlotType::hyper("RandomForestRegressor", "n_estimators");
        assert_eq!(catalog.terminals_for(&slot)[0].value, Value::Integer(10));
    }

    #[test]
    fn test_configuration_errors() {
        let mut unknown = CatalogConfig::default();
        unknown.exclude = vec!["NoSuchThing".into()];
        assert!(matches!(
            catalog(Task::Regression, &unknown),
            Err(AutopipeError::Configuration(_))
        ));

        let mut no_estimator = CatalogConfig::default();
        no_estimator.components = Some(vec!["StandardScaler".into()]);
        assert!(catalog(Task::Regression, &no_estimator).is_err());

        let mut empty_domain = CatalogConfig::default();
        empty_domain.params.insert("Normalizer.norm".into(), vec![]);
        assert!(catalog(Task::Regression, &empty_domain).is_err());

        let mut repeated = CatalogConfig::default();
        repeated.params.insert(
            "Normalizer.norm".into(),
            vec![Value::String("l1".into()), Value::String("l1".into())],
        );
        assert!(matches!(
            catalog(Task::Classification, &repeated),
            Err(AutopipeError::Configuration(_))
        ));
    }
}
