use super::{
    dummy::DummyEstimator,
    forest::{RandomForestClassifier, RandomForestRegressor},
    linear::{LogisticRegression, RidgeRegression},
    naive_bayes::GaussianNB,
    neighbors::{KNeighborsClassifier, KNeighborsRegressor},
    preprocessing::{
        FeatureAgglomeration, MinMaxScaler, Normalizer, PolynomialFeatures, SelectPercentile,
        StandardScaler, VarianceThreshold,
    },
    traits::{BuildContext, Estimator, Transformer},
    tree::{DecisionTreeClassifier, DecisionTreeRegressor},
};
use crate::types::{SlotType, Task, Value};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

/// Role a component plays in a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Transformer,
    Classifier,
    Regressor,
}

impl ComponentKind {
    pub fn output_type(&self) -> SlotType {
        match self {
            ComponentKind::Transformer => SlotType::Data,
            ComponentKind::Classifier | ComponentKind::Regressor => SlotType::Prediction,
        }
    }

    pub fn serves(&self, task: Task) -> bool {
        match self {
            ComponentKind::Transformer => true,
            ComponentKind::Classifier => task == Task::Classification,
            ComponentKind::Regressor => task == Task::Regression,
        }
    }
}

/// A constructed, unfitted component
pub enum Component {
    Transformer(Box<dyn Transformer>),
    Estimator(Box<dyn Estimator>),
}

pub type Factory = fn(&Params, &BuildContext) -> Result<Component>;

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct ComponentSpec {
    pub name: &'static str,
    pub kind: ComponentKind,
    pub params: Vec<ParamSpec>,
    pub factory: Factory,
}

/// Hyperparameter values bound for one component, keyed by parameter name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| anyhow!("missing hyperparameter '{}'", name))
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        let value = self.get(name)?;
        value
            .as_f64()
            .ok_or_else(|| anyhow!("hyperparameter '{}' must be numeric, got {}", name, value))
    }

    pub fn usize(&self, name: &str) -> Result<usize> {
        let value = self.get(name)?;
        value
            .as_i64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| anyhow!("hyperparameter '{}' must be a non-negative integer, got {}", name, value))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        let value = self.get(name)?;
        value
            .as_str()
            .ok_or_else(|| anyhow!("hyperparameter '{}' must be a string, got {}", name, value))
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        let value = self.get(name)?;
        value
            .as_bool()
            .ok_or_else(|| anyhow!("hyperparameter '{}' must be a boolean, got {}", name, value))
    }
}

/// Library of every component the search may use, in registration order.
pub struct ComponentRegistry {
    components: Vec<ComponentSpec>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            components: Vec::new(),
        };
        registry.register_transformers();
        registry.register_classifiers();
        registry.register_regressors();
        registry
    }

    pub fn get(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn all(&self) -> &[ComponentSpec] {
        &self.components
    }

    pub fn for_task(&self, task: Task) -> impl Iterator<Item = &ComponentSpec> {
        self.components.iter().filter(move |c| c.kind.serves(task))
    }

    /// Baseline estimator used when no searched pipeline is available
    pub fn fallback(&self, ctx: &BuildContext) -> Box<dyn Estimator> {
        Box::new(DummyEstimator::new(ctx))
    }

    /// Adds a component; later lookups by `name` see the first registration.
    pub fn register(&mut self, name: &'static str, kind: ComponentKind, params: Vec<ParamSpec>, factory: Factory) {
        self.components.push(ComponentSpec {
            name,
            kind,
            params,
            factory,
        });
    }

    fn register_transformers(&mut self) {
        use ComponentKind::Transformer as T;

        self.register("StandardScaler", T, vec![], |_, _| {
            Ok(Component::Transformer(Box::new(StandardScaler::default())))
        });
        self.register("MinMaxScaler", T, vec![], |_, _| {
            Ok(Component::Transformer(Box::new(MinMaxScaler::default())))
        });
        self.register(
            "Normalizer",
            T,
            vec![param("norm", strs(&["l1", "l2", "max"]))],
            |p, _| Ok(Component::Transformer(Box::new(Normalizer::new(p.str("norm")?)?))),
        );
        self.register(
            "VarianceThreshold",
            T,
            vec![param(
                "threshold",
                floats(&[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.2]),
            )],
            |p, _| {
                Ok(Component::Transformer(Box::new(VarianceThreshold::new(
                    p.f64("threshold")?,
                ))))
            },
        );
        self.register(
            "PolynomialFeatures",
            T,
            vec![param("interaction_only", bools())],
            |p, _| {
                Ok(Component::Transformer(Box::new(PolynomialFeatures::new(
                    p.bool("interaction_only")?,
                ))))
            },
        );
        self.register(
            "SelectPercentile",
            T,
            vec![param(
                "percentile",
                std::iter::once(1).chain((5..100).step_by(5)).map(Value::Integer).collect(),
            )],
            |p, ctx| {
                Ok(Component::Transformer(Box::new(SelectPercentile::new(
                    p.usize("percentile")?,
                    ctx.task,
                ))))
            },
        );
        self.register(
            "FeatureAgglomeration",
            T,
            vec![
                param("linkage", strs(&["ward", "complete", "average"])),
                param("affinity", strs(&["euclidean", "l1", "l2", "manhattan", "cosine"])),
            ],
            |p, _| {
                Ok(Component::Transformer(Box::new(FeatureAgglomeration::new(
                    p.str("linkage")?,
                    p.str("affinity")?,
                )?)))
            },
        );
    }

    fn register_classifiers(&mut self) {
        use ComponentKind::Classifier as C;

        self.register("GaussianNB", C, vec![], |_, ctx| {
            Ok(Component::Estimator(Box::new(GaussianNB::new(ctx.n_classes))))
        });
        self.register(
            "KNeighborsClassifier",
            C,
            neighbor_params(),
            |p, ctx| {
                Ok(Component::Estimator(Box::new(KNeighborsClassifier::new(
                    p.usize("n_neighbors")?,
                    p.str("weights")?,
                    p.usize("p")?,
                    ctx.n_classes,
                )?)))
            },
        );
        self.register(
            "DecisionTreeClassifier",
            C,
            vec![
                param("criterion", strs(&["gini", "entropy"])),
                param("max_depth", ints(1..=10)),
                param("min_samples_split", ints(2..=20)),
                param("min_samples_leaf", ints(1..=20)),
            ],
            |p, ctx| {
                Ok(Component::Estimator(Box::new(DecisionTreeClassifier::new(
                    p.str("criterion")?,
                    p.usize("max_depth")?,
                    p.usize("min_samples_split")?,
                    p.usize("min_samples_leaf")?,
                    ctx,
                )?)))
            },
        );
        self.register(
            "RandomForestClassifier",
            C,
            vec![
                param("n_estimators", vec![Value::Integer(100)]),
                param("criterion", strs(&["gini", "entropy"])),
                param("max_features", fractions()),
                param("min_samples_split", ints(2..=20)),
                param("min_samples_leaf", ints(1..=20)),
                param("bootstrap", bools()),
            ],
            |p, ctx| {
                Ok(Component::Estimator(Box::new(RandomForestClassifier::new(
                    p.usize("n_estimators")?,
                    p.str("criterion")?,
                    p.f64("max_features")?,
                    p.usize("min_samples_split")?,
                    p.usize("min_samples_leaf")?,
                    p.bool("bootstrap")?,
                    ctx,
                )?)))
            },
        );
        self.register(
            "LogisticRegression",
            C,
            vec![
                param(
                    "C",
                    floats(&[1e-4, 1e-3, 1e-2, 1e-1, 0.5, 1.0, 5.0, 10.0, 15.0, 20.0, 25.0]),
                ),
                param("max_iter", ints_from(&[100, 250, 500])),
            ],
            |p, ctx| {
                Ok(Component::Estimator(Box::new(LogisticRegression::new(
                    p.f64("C")?,
                    p.usize("max_iter")?,
                    ctx.n_classes,
                )?)))
            },
        );
    }

    fn register_regressors(&mut self) {
        use ComponentKind::Regressor as R;

        self.register(
            "RidgeRegression",
            R,
            vec![param("alpha", floats(&[1e-3, 1e-2, 1e-1, 1.0, 10.0, 100.0]))],
            |p, _| Ok(Component::Estimator(Box::new(RidgeRegression::new(p.f64("alpha")?)?))),
        );
        self.register("KNeighborsRegressor", R, neighbor_params(), |p, _| {
            Ok(Component::Estimator(Box::new(KNeighborsRegressor::new(
                p.usize("n_neighbors")?,
                p.str("weights")?,
                p.usize("p")?,
            )?)))
        });
        self.register(
            "DecisionTreeRegressor",
            R,
            vec![
                param("max_depth", ints(1..=10)),
                param("min_samples_split", ints(2..=20)),
                param("min_samples_leaf", ints(1..=20)),
            ],
            |p, ctx| {
                Ok(Component::Estimator(Box::new(DecisionTreeRegressor::new(
                    p.usize("max_depth")?,
                    p.usize("min_samples_split")?,
                    p.usize("min_samples_leaf")?,
                    ctx,
                )?)))
            },
        );
        self.register(
            "RandomForestRegressor",
            R,
            vec![
                param("n_estimators", vec![Value::Integer(100)]),
                param("max_features", fractions()),
                param("min_samples_split", ints(2..=20)),
                param("min_samples_leaf", ints(1..=20)),
                param("bootstrap", bools()),
            ],
            |p, ctx| {
                Ok(Component::Estimator(Box::new(RandomForestRegressor::new(
                    p.usize("n_estimators")?,
                    p.f64("max_features")?,
                    p.usize("min_samples_split")?,
                    p.usize("min_samples_leaf")?,
                    p.bool("bootstrap")?,
                    ctx,
                )?)))
            },
        );
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn param(name: &'static str, values: Vec<Value>) -> ParamSpec {
    ParamSpec { name, values }
}

fn neighbor_params() -> Vec<ParamSpec> {
    vec![
        param("n_neighbors", ints(1..=50)),
        param("weights", strs(&["uniform", "distance"])),
        param("p", ints(1..=2)),
    ]
}

fn ints(range: std::ops::RangeInclusive<i64>) -> Vec<Value> {
    range.map(Value::Integer).collect()
}

fn ints_from(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Integer).collect()
}

fn floats(values: &[f64]) -> Vec<Value> {
    values.iter().copied().map(Value::Float).collect()
}

fn strs(values: &[&str]) -> Vec<Value> {
    values.iter().map(|s| Value::String(s.to_string())).collect()
}

fn bools() -> Vec<Value> {
    vec![Value::Bool(true), Value::Bool(false)]
}

// 0.05 steps written out so every value renders exactly as listed.
fn fractions() -> Vec<Value> {
    floats(&[
        0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5, 0.55, 0.6, 0.65, 0.7, 0.75, 0.8,
        0.85, 0.9, 0.95, 1.0,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_component_retrieval() {
        let registry = ComponentRegistry::new();
        let forest = registry.get("RandomForestClassifier");
        assert!(forest.is_some());
        assert_eq!(forest.unwrap().params.len(), 6);
    }

    #[test]
    fn test_component_not_found() {
        let registry = ComponentRegistry::new();
        assert!(registry.get("NonExistent").is_none());
    }

    #[test]
    fn test_task_filtering() {
        let registry = ComponentRegistry::new();
        assert!(registry
            .for_task(Task::Regression)
            .all(|c| c.kind != ComponentKind::Classifier));
        assert!(registry
            .for_task(Task::Classification)
            .any(|c| c.name == "StandardScaler"));
    }

    #[test]
    fn test_factories_build_with_first_domain_values() {
        let registry = ComponentRegistry::new();
        let ctx = BuildContext {
            task: Task::Classification,
            n_classes: 2,
            random_state: 0,
        };
        for spec in registry.all() {
            let mut params = Params::new();
            for p in &spec.params {
                params.insert(p.name, p.values[0].clone());
            }
            let component = (spec.factory)(&params, &ctx);
            assert!(component.is_ok(), "{} failed to build", spec.name);
        }
    }

    #[test]
    fn test_params_type_errors() {
        let mut params = Params::new();
        params.insert("k", Value::String("x".into()));
        assert!(params.usize("k").is_err());
        assert!(params.f64("missing").is_err());
    }
}
