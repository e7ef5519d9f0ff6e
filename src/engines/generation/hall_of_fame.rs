use crate::engines::evaluation::EvaluatedIndividual;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Order between pipelines with equal scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Fewer stages first, then the earlier evaluation
    #[default]
    ShorterPipeline,
    FirstFound,
    /// Lexicographic order of the canonical string
    Canonical,
}

impl TieBreak {
    pub fn compare(&self, a: &EvaluatedIndividual, b: &EvaluatedIndividual) -> Ordering {
        match self {
            TieBreak::ShorterPipeline => a
                .length()
                .cmp(&b.length())
                .then(a.evaluation_id.cmp(&b.evaluation_id)),
            TieBreak::FirstFound => a.evaluation_id.cmp(&b.evaluation_id),
            TieBreak::Canonical => a.canonical.cmp(&b.canonical),
        }
    }
}

/// Best scored pipelines seen during the search, best first, at most one
/// entry per canonical form.
pub struct HallOfFame {
    members: Vec<EvaluatedIndividual>,
    max_size: usize,
    seen: HashSet<String>,
    tie_break: TieBreak,
}

impl HallOfFame {
    pub fn new(max_size: usize, tie_break: TieBreak) -> Self {
        Self {
            members: Vec::new(),
            max_size,
            seen: HashSet::new(),
            tie_break,
        }
    }

    /// Adds a scored individual. Returns false for duplicates, unscored
    /// individuals, and ones that fall off the end.
    pub fn try_add(&mut self, candidate: &EvaluatedIndividual) -> bool {
        if !candidate.is_scored() || self.seen.contains(&candidate.canonical) {
            return false;
        }

        let tie_break = self.tie_break;
        let position = self
            .members
            .partition_point(|m| ranks_before(m, candidate, tie_break) != Ordering::Greater);
        if position >= self.max_size {
            return false;
        }

        self.seen.insert(candidate.canonical.clone());
        self.members.insert(position, candidate.clone());
        if self.members.len() > self.max_size {
            if let Some(removed) = self.members.pop() {
                self.seen.remove(&removed.canonical);
            }
        }
        true
    }

    pub fn get_all(&self) -> &[EvaluatedIndividual] {
        &self.members
    }

    pub fn get_top_n(&self, n: usize) -> &[EvaluatedIndividual] {
        &self.members[..n.min(self.members.len())]
    }

    pub fn best(&self) -> Option<&EvaluatedIndividual> {
        self.members.first()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Score descending, then the tie-break
fn ranks_before(a: &EvaluatedIndividual, b: &EvaluatedIndividual, tie_break: TieBreak) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| tie_break.compare(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::EvaluationState;
    use crate::engines::generation::individual::{Individual, Node};
    use crate::functions::{ComponentKind, PrimitiveDef};
    use crate::types::SlotType;
    use std::sync::Arc;
    use std::time::Duration;

    fn pipeline(names: &[&str]) -> Individual {
        let mut nodes = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let (kind, output) = if i == 0 {
                (ComponentKind::Regressor, SlotType::Prediction)
            } else {
                (ComponentKind::Transformer, SlotType::Data)
            };
            nodes.push(Node::Primitive(Arc::new(PrimitiveDef {
                name: name.to_string(),
                kind,
                inputs: vec![SlotType::Data],
                output,
            })));
        }
        nodes.push(Node::Data);
        Individual::new(nodes)
    }

    fn scored(names: &[&str], score: f64, id: usize) -> EvaluatedIndividual {
        let mut evaluated = EvaluatedIndividual::pending(pipeline(names), id);
        evaluated.state = EvaluationState::Scored;
        evaluated.score = score;
        evaluated.duration = Duration::from_millis(1);
        evaluated
    }

    #[test]
    fn test_sorted_by_score_and_deduplicated() {
        let mut hof = HallOfFame::new(10, TieBreak::ShorterPipeline);
        assert!(hof.try_add(&scored(&["A"], -2.0, 0)));
        assert!(hof.try_add(&scored(&["B"], -1.0, 1)));
        assert!(!hof.try_add(&scored(&["A"], 5.0, 2)));
        assert_eq!(hof.len(), 2);
        assert_eq!(hof.best().unwrap().canonical, "B(data)");
    }

    #[test]
    fn test_shorter_pipeline_wins_ties() {
        let mut hof = HallOfFame::new(10, TieBreak::ShorterPipeline);
        hof.try_add(&scored(&["A", "S"], 1.0, 0));
        hof.try_add(&scored(&["B"], 1.0, 1));
        assert_eq!(hof.best().unwrap().canonical, "B(data)");

        let mut hof = HallOfFame::new(10, TieBreak::FirstFound);
        hof.try_add(&scored(&["A", "S"], 1.0, 0));
        hof.try_add(&scored(&["B"], 1.0, 1));
        assert_eq!(hof.best().unwrap().canonical, "A(S(data))");
    }

    #[test]
    fn test_capacity_and_unscored() {
        let mut hof = HallOfFame::new(2, TieBreak::FirstFound);
        hof.try_add(&scored(&["A"], 1.0, 0));
        hof.try_add(&scored(&["B"], 2.0, 1));
        assert!(!hof.try_add(&scored(&["C"], 0.5, 2)));
        assert!(hof.try_add(&scored(&["D"], 3.0, 3)));
        let names: Vec<_> = hof.get_all().iter().map(|m| m.canonical.as_str()).collect();
        assert_eq!(names, vec!["D(data)", "B(data)"]);
        // evicted members may come back later
        assert!(hof.try_add(&scored(&["A"], 4.0, 4)));

        let pending = EvaluatedIndividual::pending(pipeline(&["E"]), 5);
        assert!(!hof.try_add(&pending));
        assert_eq!(hof.get_top_n(1).len(), 1);
    }
}
