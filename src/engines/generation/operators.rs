use super::individual::{find_unmatched_terminal, Individual, Node};
use crate::config::MutationWeights;
use crate::error::{AutopipeError, Result};
use crate::functions::{Catalog, ComponentKind, PrimitiveDef};
use crate::types::SlotType;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Structure-preserving edit kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    ReplaceTerminal,
    ReplacePrimitive,
    Insert,
    Shrink,
}

impl MutationKind {
    pub const ALL: [MutationKind; 4] = [
        MutationKind::ReplaceTerminal,
        MutationKind::ReplacePrimitive,
        MutationKind::Insert,
        MutationKind::Shrink,
    ];
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::ReplaceTerminal => "replace_terminal",
            MutationKind::ReplacePrimitive => "replace_primitive",
            MutationKind::Insert => "insert",
            MutationKind::Shrink => "shrink",
        };
        write!(f, "{}", name)
    }
}

fn structural(message: impl Into<String>) -> AutopipeError {
    AutopipeError::Structural(message.into())
}

/// Fresh terminals for every hyperparameter slot of `primitive`
fn random_terminals<R: Rng>(primitive: &PrimitiveDef, catalog: &Catalog, rng: &mut R) -> Result<Vec<Node>> {
    primitive
        .hyper_inputs()
        .iter()
        .map(|slot| {
            catalog
                .terminals_for(slot)
                .choose(rng)
                .cloned()
                .map(Node::Terminal)
                .ok_or_else(|| structural(format!("catalog has no values for {}", slot)))
        })
        .collect()
}

/// Random pipeline: an estimator over 0 to `max_length - 1` transformers.
pub fn random_individual<R: Rng>(catalog: &Catalog, max_length: usize, rng: &mut R) -> Result<Individual> {
    let estimators = catalog.primitives_for(&SlotType::Prediction);
    let transformers = catalog.primitives_for(&SlotType::Data);
    let estimator = estimators
        .choose(rng)
        .ok_or_else(|| structural("catalog has no estimator"))?;

    let mut chain: Vec<Arc<PrimitiveDef>> = vec![Arc::clone(estimator)];
    if !transformers.is_empty() {
        let depth = rng.gen_range(0..max_length.max(1));
        for _ in 0..depth {
            if let Some(t) = transformers.choose(rng) {
                chain.push(Arc::clone(t));
            }
        }
    }

    let mut nodes: Vec<Node> = chain.iter().cloned().map(Node::Primitive).collect();
    nodes.push(Node::Data);
    for primitive in chain.iter().rev() {
        nodes.extend(random_terminals(primitive, catalog, rng)?);
    }
    Ok(Individual::new(nodes))
}

/// Replaces one terminal with a different value of the same slot type.
/// Only terminals whose slot offers a different value are candidates.
pub fn mut_replace_terminal<R: Rng>(ind: &mut Individual, catalog: &Catalog, rng: &mut R) -> Result<bool> {
    let candidates: Vec<usize> = ind
        .nodes()
        .iter()
        .enumerate()
        .filter_map(|(i, node)| {
            let terminal = node.as_terminal()?;
            catalog
                .terminals_for(&terminal.slot)
                .iter()
                .any(|t| t.value != terminal.value)
                .then_some(i)
        })
        .collect();
    let Some(&pos) = candidates.choose(rng) else {
        return Ok(false);
    };

    let Node::Terminal(current) = &ind.nodes()[pos] else {
        return Err(structural("terminal candidate is not a terminal"));
    };
    let alternatives: Vec<_> = catalog
        .terminals_for(&current.slot)
        .iter()
        .filter(|t| t.value != current.value)
        .collect();
    let replacement = alternatives
        .choose(rng)
        .map(|t| (*t).clone())
        .ok_or_else(|| structural(format!("no alternative value for {}", current.slot)))?;
    ind.nodes_mut()[pos] = Node::Terminal(replacement);
    Ok(true)
}

fn primitive_alternatives<'a>(catalog: &'a Catalog, current: &PrimitiveDef) -> Vec<&'a Arc<PrimitiveDef>> {
    catalog
        .primitives_for(&current.output)
        .into_iter()
        .filter(|p| p.name != current.name && p.inputs.first() == current.inputs.first())
        .collect()
}

/// Replaces one primitive with another producing the same type; the old
/// hyperparameter terminals are swapped for fresh ones of the new primitive.
pub fn mut_replace_primitive<R: Rng>(ind: &mut Individual, catalog: &Catalog, rng: &mut R) -> Result<bool> {
    let candidates: Vec<usize> = ind
        .nodes()
        .iter()
        .enumerate()
        .filter_map(|(i, node)| {
            let p = node.as_primitive()?;
            (!primitive_alternatives(catalog, p).is_empty()).then_some(i)
        })
        .collect();
    let Some(&pos) = candidates.choose(rng) else {
        return Ok(false);
    };

    let old = ind.nodes()[pos]
        .as_primitive()
        .cloned()
        .ok_or_else(|| structural("primitive candidate is not a primitive"))?;
    let new = primitive_alternatives(catalog, &old)
        .choose(rng)
        .map(|p| Arc::clone(p))
        .ok_or_else(|| structural(format!("no alternative for {}", old.name)))?;

    let data_end = ind
        .subtree_end(pos + 1)
        .ok_or_else(|| structural(format!("incomplete data input of {} in {}", old.name, ind)))?;
    let old_end = ind
        .subtree_end(pos)
        .ok_or_else(|| structural(format!("incomplete subtree of {} in {}", old.name, ind)))?;
    let terminals = random_terminals(&new, catalog, rng)?;

    let nodes = ind.nodes_mut();
    nodes.splice(data_end..old_end, terminals);
    nodes[pos] = Node::Primitive(new);
    Ok(true)
}

/// Wraps a random data-producing subtree in a new transformer.
pub fn mut_insert<R: Rng>(
    ind: &mut Individual,
    catalog: &Catalog,
    max_length: usize,
    rng: &mut R,
) -> Result<bool> {
    if ind.primitive_count() >= max_length {
        return Ok(false);
    }
    let transformers = catalog.primitives_for(&SlotType::Data);
    let Some(&new) = transformers.choose(rng) else {
        return Ok(false);
    };
    let candidates: Vec<usize> = ind
        .nodes()
        .iter()
        .enumerate()
        .filter(|(_, node)| node.output() == &SlotType::Data)
        .map(|(i, _)| i)
        .collect();
    let Some(&pos) = candidates.choose(rng) else {
        return Ok(false);
    };

    let end = ind
        .subtree_end(pos)
        .ok_or_else(|| structural(format!("incomplete subtree at {} in {}", pos, ind)))?;
    let terminals = random_terminals(new, catalog, rng)?;

    let nodes = ind.nodes_mut();
    nodes.splice(end..end, terminals);
    nodes.insert(pos, Node::Primitive(Arc::clone(new)));
    Ok(true)
}

/// Removes one transformer and the terminals it leaves orphaned.
pub fn mut_shrink<R: Rng>(ind: &mut Individual, rng: &mut R) -> Result<bool> {
    let candidates: Vec<usize> = ind
        .nodes()
        .iter()
        .enumerate()
        .filter(|(_, node)| {
            node.as_primitive()
                .is_some_and(|p| p.kind == ComponentKind::Transformer)
        })
        .map(|(i, _)| i)
        .collect();
    let Some(&pos) = candidates.choose(rng) else {
        return Ok(false);
    };

    let nodes = ind.nodes_mut();
    let removed = nodes.remove(pos);
    let orphans = removed.arity().saturating_sub(1);
    if orphans > 0 {
        let start = find_unmatched_terminal(nodes)
            .ok_or_else(|| structural(format!("no orphaned terminals after removing {}", removed.label())))?;
        if start + orphans > nodes.len() {
            return Err(structural("orphaned terminals run past the end of the pipeline"));
        }
        nodes.drain(start..start + orphans);
    }
    Ok(true)
}

/// Applies one applicable mutation kind, chosen by weight. Kinds that turn
/// out not to apply are dropped and the draw repeated. Returns `None` when no
/// kind applies to `ind`.
pub fn random_valid_mutation<R: Rng>(
    ind: &mut Individual,
    catalog: &Catalog,
    weights: &MutationWeights,
    max_length: usize,
    rng: &mut R,
) -> Result<Option<MutationKind>> {
    let mut kinds: Vec<MutationKind> = MutationKind::ALL
        .into_iter()
        .filter(|k| weights.weight(*k) > 0.0)
        .collect();

    while !kinds.is_empty() {
        let dist = WeightedIndex::new(kinds.iter().map(|k| weights.weight(*k)))
            .map_err(|e| AutopipeError::Configuration(format!("mutation weights: {}", e)))?;
        let kind = kinds[dist.sample(rng)];
        let applied = match kind {
            MutationKind::ReplaceTerminal => mut_replace_terminal(ind, catalog, rng)?,
            MutationKind::ReplacePrimitive => mut_replace_primitive(ind, catalog, rng)?,
            MutationKind::Insert => mut_insert(ind, catalog, max_length, rng)?,
            MutationKind::Shrink => mut_shrink(ind, rng)?,
        };
        if applied {
            debug_assert!(ind.validate().is_ok(), "{} produced {}", kind, ind);
            return Ok(Some(kind));
        }
        kinds.retain(|k| *k != kind);
    }
    Ok(None)
}

/// Typed one-point crossover: swaps a data-producing subtree of `a` with one
/// of `b`, at least one side being a primitive. Returns `None` when no such
/// pair exists or a child would exceed `max_length` primitives.
pub fn cx_one_point<R: Rng>(
    a: &Individual,
    b: &Individual,
    max_length: usize,
    rng: &mut R,
) -> Result<Option<(Individual, Individual)>> {
    let data_positions = |ind: &Individual| -> Vec<usize> {
        ind.nodes()
            .iter()
            .enumerate()
            .filter(|(_, n)| n.output() == &SlotType::Data)
            .map(|(i, _)| i)
            .collect()
    };
    let pairs: Vec<(usize, usize)> = data_positions(a)
        .into_iter()
        .flat_map(|i| data_positions(b).into_iter().map(move |j| (i, j)))
        .filter(|&(i, j)| a.nodes()[i].is_primitive() || b.nodes()[j].is_primitive())
        .collect();
    let Some(&(i, j)) = pairs.choose(rng) else {
        return Ok(None);
    };

    let a_end = a
        .subtree_end(i)
        .ok_or_else(|| structural(format!("incomplete subtree in {}", a)))?;
    let b_end = b
        .subtree_end(j)
        .ok_or_else(|| structural(format!("incomplete subtree in {}", b)))?;

    let splice = |host: &Individual, at: usize, end: usize, donor: &[Node]| {
        let mut nodes = host.nodes()[..at].to_vec();
        nodes.extend_from_slice(donor);
        nodes.extend_from_slice(&host.nodes()[end..]);
        Individual::new(nodes)
    };
    let child_a = splice(a, i, a_end, &b.nodes()[j..b_end]);
    let child_b = splice(b, j, b_end, &a.nodes()[i..a_end]);
    if child_a.primitive_count() > max_length || child_b.primitive_count() > max_length {
        return Ok(None);
    }
    Ok(Some((child_a, child_b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::engines::generation::parser::parse_individual;
    use crate::functions::ComponentRegistry;
    use crate::types::{Task, Value};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog() -> Catalog {
        Catalog::from_registry(ComponentRegistry::new(), Task::Classification, &CatalogConfig::default())
            .unwrap()
    }

    #[test]
    fn test_random_individuals_are_valid() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let ind = random_individual(&catalog, 3, &mut rng).unwrap();
            ind.validate().unwrap();
            assert!(ind.primitive_count() <= 3);
        }
    }

    #[test]
    fn test_shrink_removes_orphans() {
        let catalog = catalog();
        let mut ind = parse_individual(
            "GaussianNB(Normalizer(MinMaxScaler(data), Normalizer.norm='l1'))",
            &catalog,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(mut_shrink(&mut ind, &mut rng).unwrap());
        ind.validate().unwrap();
        assert_eq!(ind.primitive_count(), 2);
    }

    #[test]
    fn test_insert_respects_length_limit() {
        let catalog = catalog();
        let mut ind = parse_individual("GaussianNB(StandardScaler(data))", &catalog).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(!mut_insert(&mut ind, &catalog, 2, &mut rng).unwrap());
        assert!(mut_insert(&mut ind, &catalog, 3, &mut rng).unwrap());
        ind.validate().unwrap();
        assert_eq!(ind.primitive_count(), 3);
    }

    #[test]
    fn test_crossover_children_are_valid() {
        let catalog = catalog();
        let a = parse_individual("GaussianNB(StandardScaler(data))", &catalog).unwrap();
        let b = parse_individual(
            "LogisticRegression(Normalizer(data, Normalizer.norm='max'), LogisticRegression.C=0.5, LogisticRegression.max_iter=100)",
            &catalog,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            if let Some((x, y)) = cx_one_point(&a, &b, 3, &mut rng).unwrap() {
                x.validate().unwrap();
                y.validate().unwrap();
            }
        }
    }

    #[test]
    fn test_replace_terminal_skips_single_value_slots() {
        let mut config = CatalogConfig::default();
        config
            .params
            .insert("Normalizer.norm".into(), vec![Value::String("l1".into())]);
        let catalog = Catalog::from_registry(ComponentRegistry::new(), Task::Classification, &config).unwrap();
        let mut ind =
            parse_individual("GaussianNB(Normalizer(data, Normalizer.norm='l1'))", &catalog).unwrap();
        let before = ind.clone();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(!mut_replace_terminal(&mut ind, &catalog, &mut rng).unwrap());
        assert_eq!(ind, before);
    }

    #[test]
    fn test_no_mutation_applies_to_fixed_pipeline() {
        let mut config = CatalogConfig::default();
        config.components = Some(vec!["GaussianNB".into()]);
        let catalog = Catalog::from_registry(ComponentRegistry::new(), Task::Classification, &config).unwrap();
        let mut ind = parse_individual("GaussianNB(data)", &catalog).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let applied =
            random_valid_mutation(&mut ind, &catalog, &MutationWeights::default(), 3, &mut rng).unwrap();
        assert_eq!(applied, None);
    }
}
