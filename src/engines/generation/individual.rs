use crate::error::{AutopipeError, Result};
use crate::functions::{ComponentKind, PrimitiveDef, Terminal};
use crate::types::SlotType;
use std::fmt;
use std::sync::Arc;

static DATA_SLOT: SlotType = SlotType::Data;
static PREDICTION_SLOT: SlotType = SlotType::Prediction;

/// One element of a flattened pipeline tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Primitive(Arc<PrimitiveDef>),
    /// The dataset leaf feeding the innermost stage
    Data,
    Terminal(Terminal),
}

impl Node {
    pub fn output(&self) -> &SlotType {
        match self {
            Node::Primitive(p) => &p.output,
            Node::Data => &DATA_SLOT,
            Node::Terminal(t) => &t.slot,
        }
    }

    pub fn inputs(&self) -> &[SlotType] {
        match self {
            Node::Primitive(p) => &p.inputs,
            _ => &[],
        }
    }

    pub fn arity(&self) -> usize {
        self.inputs().len()
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Node::Primitive(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::Terminal(_))
    }

    pub fn as_primitive(&self) -> Option<&Arc<PrimitiveDef>> {
        match self {
            Node::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_terminal(&self) -> Option<&Terminal> {
        match self {
            Node::Terminal(t) => Some(t),
            _ => None,
        }
    }

    /// Short label used in diagnostics
    pub fn label(&self) -> String {
        match self {
            Node::Primitive(p) => p.name.clone(),
            Node::Data => "data".to_string(),
            Node::Terminal(t) => t.to_string(),
        }
    }
}

/// Scans a possibly spliced prefix-order sequence and returns the index of the
/// first leaf that no pending input slot can take, or `None` when every leaf
/// is consumed.
///
/// Each primitive opens its input slots; a node whose output matches the most
/// recently opened slot closes it. A nested primitive closes its enclosing
/// slot immediately and opens its own, which must be filled before any
/// outer slot can be.
pub fn find_unmatched_terminal(nodes: &[Node]) -> Option<usize> {
    let mut pending: Vec<&SlotType> = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        if pending.last() == Some(&node.output()) {
            pending.pop();
        } else if !node.is_primitive() {
            return Some(i);
        }
        pending.extend(node.inputs().iter().rev());
    }
    None
}

/// Exclusive end of the subtree rooted at `start`, or `None` if the sequence
/// ends before that subtree is complete.
pub fn subtree_end(nodes: &[Node], start: usize) -> Option<usize> {
    let mut open = 1usize;
    for (i, node) in nodes.iter().enumerate().skip(start) {
        open = open - 1 + node.arity();
        if open == 0 {
            return Some(i + 1);
        }
    }
    None
}

/// Candidate pipeline: a prefix-order flattening of a typed tree whose root
/// is a prediction-producing primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    nodes: Vec<Node>,
}

impl Individual {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut Vec<Node> {
        &mut self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn primitives(&self) -> impl Iterator<Item = &Arc<PrimitiveDef>> {
        self.nodes.iter().filter_map(Node::as_primitive)
    }

    pub fn terminals(&self) -> impl Iterator<Item = &Terminal> {
        self.nodes.iter().filter_map(Node::as_terminal)
    }

    /// Number of pipeline stages, the secondary search objective
    pub fn primitive_count(&self) -> usize {
        self.primitives().count()
    }

    pub fn transformer_count(&self) -> usize {
        self.primitives()
            .filter(|p| p.kind == ComponentKind::Transformer)
            .count()
    }

    /// The root stage
    pub fn main_estimator(&self) -> Option<&Arc<PrimitiveDef>> {
        self.nodes.first().and_then(Node::as_primitive)
    }

    pub fn subtree_end(&self, start: usize) -> Option<usize> {
        subtree_end(&self.nodes, start)
    }

    /// Checks that the sequence is one root-complete, type-correct tree
    /// producing a prediction.
    pub fn validate(&self) -> Result<()> {
        let mut pending = vec![&PREDICTION_SLOT];
        for (i, node) in self.nodes.iter().enumerate() {
            let Some(expected) = pending.pop() else {
                return Err(AutopipeError::Structural(format!(
                    "trailing node '{}' at position {} in {}",
                    node.label(),
                    i,
                    self
                )));
            };
            if node.output() != expected {
                return Err(AutopipeError::Structural(format!(
                    "node '{}' at position {} produces {} where {} is required",
                    node.label(),
                    i,
                    node.output(),
                    expected
                )));
            }
            if let Node::Primitive(p) = node {
                if p.inputs.first() != Some(&SlotType::Data) {
                    return Err(AutopipeError::Structural(format!(
                        "primitive '{}' does not take data as its first input",
                        p.name
                    )));
                }
            }
            pending.extend(node.inputs().iter().rev());
        }
        if !pending.is_empty() {
            return Err(AutopipeError::Structural(format!(
                "sequence ends with {} unfilled input slot(s): {}",
                pending.len(),
                self
            )));
        }
        Ok(())
    }

    /// Canonical nested-call form, used as the identity of a pipeline
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    fn render(&self, at: usize, f: &mut fmt::Formatter<'_>) -> std::result::Result<usize, fmt::Error> {
        let Some(node) = self.nodes.get(at) else {
            return Ok(at);
        };
        match node {
            Node::Primitive(p) => {
                write!(f, "{}(", p.name)?;
                let mut next = at + 1;
                for arg in 0..p.arity() {
                    if next >= self.nodes.len() {
                        break;
                    }
                    if arg > 0 {
                        write!(f, ", ")?;
                    }
                    next = self.render(next, f)?;
                }
                write!(f, ")")?;
                Ok(next)
            }
            other => {
                write!(f, "{}", other.label())?;
                Ok(at + 1)
            }
        }
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut at = 0;
        while at < self.nodes.len() {
            if at > 0 {
                write!(f, " ")?;
            }
            at = self.render(at, f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::engines::generation::parser::parse_individual;
    use crate::functions::{Catalog, ComponentRegistry};
    use crate::types::Task;

    const NESTED: &str = "RandomForestClassifier(FeatureAgglomeration(data, \
        FeatureAgglomeration.linkage='complete', FeatureAgglomeration.affinity='l2'), \
        RandomForestClassifier.n_estimators=100, RandomForestClassifier.criterion='gini', \
        RandomForestClassifier.max_features=0.6, RandomForestClassifier.min_samples_split=6, \
        RandomForestClassifier.min_samples_leaf=7, RandomForestClassifier.bootstrap=True)";

    fn catalog() -> Catalog {
        Catalog::from_registry(ComponentRegistry::new(), Task::Classification, &CatalogConfig::default())
            .unwrap()
    }

    #[test]
    fn test_find_unmatched_terminal() {
        let catalog = catalog();
        let nb = parse_individual("GaussianNB(data)", &catalog).unwrap();
        assert_eq!(find_unmatched_terminal(&nb.nodes()[1..]), Some(0));

        let nested = parse_individual(NESTED, &catalog).unwrap();
        assert_eq!(find_unmatched_terminal(&nested.nodes()[1..]), Some(4));

        let mut without_fa = nested.nodes()[..1].to_vec();
        without_fa.extend_from_slice(&nested.nodes()[2..]);
        assert_eq!(find_unmatched_terminal(&without_fa), Some(2));

        assert_eq!(find_unmatched_terminal(nested.nodes()), None);
        assert_eq!(find_unmatched_terminal(&[]), None);
    }

    #[test]
    fn test_subtree_spans() {
        let nested = parse_individual(NESTED, &catalog()).unwrap();
        assert_eq!(nested.subtree_end(0), Some(nested.len()));
        assert_eq!(nested.subtree_end(1), Some(5));
        assert_eq!(nested.subtree_end(2), Some(3));
        assert_eq!(subtree_end(&nested.nodes()[..4], 1), None);
    }

    #[test]
    fn test_validate_detects_damage() {
        let nested = parse_individual(NESTED, &catalog()).unwrap();
        assert!(nested.validate().is_ok());
        assert_eq!(nested.primitive_count(), 2);
        assert_eq!(nested.transformer_count(), 1);
        assert_eq!(nested.main_estimator().unwrap().name, "RandomForestClassifier");

        let truncated = Individual::new(nested.nodes()[..nested.len() - 1].to_vec());
        assert!(matches!(truncated.validate(), Err(AutopipeError::Structural(_))));

        let mut spliced = nested.nodes()[..1].to_vec();
        spliced.extend_from_slice(&nested.nodes()[2..]);
        assert!(Individual::new(spliced).validate().is_err());

        let mut trailing = nested.nodes().to_vec();
        trailing.push(Node::Data);
        assert!(Individual::new(trailing).validate().is_err());

        assert!(Individual::new(vec![Node::Data]).validate().is_err());
    }

    #[test]
    fn test_display_renders_canonical_form() {
        let nested = parse_individual(NESTED, &catalog()).unwrap();
        assert_eq!(nested.to_string(), NESTED);
    }
}
