use super::pipeline::Pipeline;
use crate::engines::generation::individual::{Individual, Node};
use crate::error::{AutopipeError, Result};
use crate::functions::registry::{Component, Params};
use crate::functions::traits::{BuildContext, Estimator, Transformer};
use crate::functions::Catalog;
use crate::types::SlotType;

/// Builds an unfitted pipeline from an individual.
///
/// A tree that is malformed or mistyped yields a `Structural` error; a
/// well-formed tree naming something the catalog cannot provide, or whose
/// hyperparameters a component rejects, yields a `Compile` error.
pub fn compile_individual(ind: &Individual, catalog: &Catalog, ctx: &BuildContext) -> Result<Pipeline> {
    let mut walk = Walk {
        nodes: ind.nodes(),
        catalog,
        ctx,
        steps: Vec::new(),
        estimator: None,
    };
    let end = walk.stage(0, &SlotType::Prediction)?;
    if end != ind.len() {
        return Err(AutopipeError::Structural(format!(
            "{} trailing node(s) after the pipeline root in {}",
            ind.len() - end,
            ind
        )));
    }
    let (name, estimator) = walk
        .estimator
        .ok_or_else(|| AutopipeError::Structural(format!("no estimator at the root of {}", ind)))?;
    Ok(Pipeline::new(walk.steps, name, estimator))
}

struct Walk<'a> {
    nodes: &'a [Node],
    catalog: &'a Catalog,
    ctx: &'a BuildContext,
    steps: Vec<(String, Box<dyn Transformer>)>,
    estimator: Option<(String, Box<dyn Estimator>)>,
}

impl<'a> Walk<'a> {
    /// Compiles the stage at `at`, producing `expected`, and returns the
    /// index just past its subtree. Inner stages are pushed first.
    fn stage(&mut self, at: usize, expected: &SlotType) -> Result<usize> {
        let node = self.nodes.get(at).ok_or_else(|| {
            AutopipeError::Structural(format!("sequence ends where {} is required", expected))
        })?;
        let primitive = match node {
            Node::Data if *expected == SlotType::Data => return Ok(at + 1),
            Node::Primitive(p) if p.output == *expected => p,
            other => {
                return Err(AutopipeError::Structural(format!(
                    "node '{}' at position {} produces {} where {} is required",
                    other.label(),
                    at,
                    other.output(),
                    expected
                )))
            }
        };
        if primitive.inputs.first() != Some(&SlotType::Data) {
            return Err(AutopipeError::Structural(format!(
                "primitive '{}' does not take data as its first input",
                primitive.name
            )));
        }

        let mut next = self.stage(at + 1, &SlotType::Data)?;

        let mut params = Params::new();
        for slot in primitive.hyper_inputs() {
            let terminal = match self.nodes.get(next) {
                Some(Node::Terminal(t)) if t.slot == *slot => t,
                Some(other) => {
                    return Err(AutopipeError::Structural(format!(
                        "node '{}' at position {} cannot fill {}",
                        other.label(),
                        next,
                        slot
                    )))
                }
                None => {
                    return Err(AutopipeError::Structural(format!(
                        "sequence ends where {} is required",
                        slot
                    )))
                }
            };
            if !self
                .catalog
                .terminals_for(slot)
                .iter()
                .any(|t| t.value == terminal.value)
            {
                return Err(AutopipeError::Compile(format!(
                    "value {} is not in the domain of {}",
                    terminal.value, slot
                )));
            }
            params.insert(terminal.param(), terminal.value.clone());
            next += 1;
        }

        match self.catalog.primitive(&primitive.name) {
            Some(known) if **known == **primitive => {}
            Some(_) => {
                return Err(AutopipeError::Compile(format!(
                    "primitive '{}' does not match its catalog signature",
                    primitive.name
                )))
            }
            None => {
                return Err(AutopipeError::Compile(format!(
                    "primitive '{}' is not in the catalog",
                    primitive.name
                )))
            }
        }
        let spec = self.catalog.component(&primitive.name).ok_or_else(|| {
            AutopipeError::Compile(format!("no component registered as '{}'", primitive.name))
        })?;
        let component = (spec.factory)(&params, self.ctx)
            .map_err(|e| AutopipeError::Compile(format!("{}: {:#}", primitive.name, e)))?;

        match component {
            Component::Transformer(t) if *expected == SlotType::Data => {
                self.steps.push((primitive.name.clone(), t));
            }
            Component::Estimator(e) if *expected == SlotType::Prediction && self.estimator.is_none() => {
                self.estimator = Some((primitive.name.clone(), e));
            }
            _ => {
                return Err(AutopipeError::Compile(format!(
                    "component '{}' cannot produce {}",
                    primitive.name, expected
                )))
            }
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::engines::generation::parser::parse_individual;
    use crate::functions::ComponentRegistry;
    use crate::types::Task;

    fn classification() -> (Catalog, BuildContext) {
        let catalog =
            Catalog::from_registry(ComponentRegistry::new(), Task::Classification, &CatalogConfig::default())
                .unwrap();
        let ctx = BuildContext {
            task: Task::Classification,
            n_classes: 2,
            random_state: 0,
        };
        (catalog, ctx)
    }

    #[test]
    fn test_compiles_in_execution_order() {
        let (catalog, ctx) = classification();
        let ind = parse_individual(
            "GaussianNB(Normalizer(MinMaxScaler(data), Normalizer.norm='l2'))",
            &catalog,
        )
        .unwrap();
        let pipeline = compile_individual(&ind, &catalog, &ctx).unwrap();
        assert_eq!(pipeline.step_names(), vec!["MinMaxScaler", "Normalizer", "GaussianNB"]);
    }

    #[test]
    fn test_truncated_sequence_is_structural() {
        let (catalog, ctx) = classification();
        let ind = parse_individual("GaussianNB(MinMaxScaler(data))", &catalog).unwrap();
        let truncated = Individual::new(ind.nodes()[..2].to_vec());
        assert!(matches!(
            compile_individual(&truncated, &catalog, &ctx),
            Err(AutopipeError::Structural(_))
        ));
    }
}
