//! NSGA-II survivor selection over (score, pipeline length).

use std::cmp::Ordering;

/// Whether an objective is better when larger or smaller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationDirection {
    Maximize,
    Minimize,
}

/// Objectives used for survivor selection: cross-validated score up, primitive count down.
pub const SEARCH_OBJECTIVES: [OptimizationDirection; 2] =
    [OptimizationDirection::Maximize, OptimizationDirection::Minimize];

#[derive(Debug, Clone)]
pub struct MultiObjectiveIndividual<T> {
    pub data: T,
    pub objectives: Vec<f64>,
    pub rank: usize,            // 0 = first front
    pub crowding_distance: f64,
}

impl<T> MultiObjectiveIndividual<T> {
    pub fn new(data: T, objectives: Vec<f64>) -> Self {
        Self {
            data,
            objectives,
            rank: 0,
            crowding_distance: 0.0,
        }
    }
}

/// A dominates B if it is no worse on every objective and strictly better on one.
pub fn dominates(a: &[f64], b: &[f64], directions: &[OptimizationDirection]) -> bool {
    if a.len() != b.len() || a.len() != directions.len() {
        return false;
    }

    let mut strictly_better = false;
    for ((&a_val, &b_val), direction) in a.iter().zip(b).zip(directions) {
        let (a_better, b_better) = match direction {
            OptimizationDirection::Maximize => (a_val > b_val, b_val > a_val),
            OptimizationDirection::Minimize => (a_val < b_val, b_val < a_val),
        };
        if b_better {
            return false;
        }
        strictly_better |= a_better;
    }
    strictly_better
}

/// Fast non-dominated sort. Assigns `rank` and returns index lists per front.
pub fn fast_non_dominated_sort<T>(
    individuals: &mut [MultiObjectiveIndividual<T>],
    directions: &[OptimizationDirection],
) -> Vec<Vec<usize>> {
    let n = individuals.len();
    let mut domination_count = vec![0usize; n];
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut first_front = Vec::new();

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if dominates(&individuals[i].objectives, &individuals[j].objectives, directions) {
                dominated[i].push(j);
            } else if dominates(&individuals[j].objectives, &individuals[i].objectives, directions) {
                domination_count[i] += 1;
            }
        }
        if domination_count[i] == 0 {
            individuals[i].rank = 0;
            first_front.push(i);
        }
    }

    let mut fronts = vec![first_front];
    let mut current = 0;
    while current < fronts.len() && !fronts[current].is_empty() {
        let mut next = Vec::new();
        for &i in &fronts[current] {
            for &j in &dominated[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    individuals[j].rank = current + 1;
                    next.push(j);
                }
            }
        }
        if !next.is_empty() {
            fronts.push(next);
        }
        current += 1;
    }
    fronts.retain(|f| !f.is_empty());
    fronts
}

/// Crowding distance of each member of one front; boundary members get infinity.
pub fn calculate_crowding_distance<T>(
    individuals: &mut [MultiObjectiveIndividual<T>],
    front: &[usize],
) {
    let size = front.len();
    if size <= 2 {
        for &idx in front {
            individuals[idx].crowding_distance = f64::INFINITY;
        }
        return;
    }

    for &idx in front {
        individuals[idx].crowding_distance = 0.0;
    }

    let num_objectives = individuals[front[0]].objectives.len();
    for obj in 0..num_objectives {
        let mut sorted = front.to_vec();
        sorted.sort_by(|&a, &b| {
            individuals[a].objectives[obj].total_cmp(&individuals[b].objectives[obj])
        });

        individuals[sorted[0]].crowding_distance = f64::INFINITY;
        individuals[sorted[size - 1]].crowding_distance = f64::INFINITY;

        let range = individuals[sorted[size - 1]].objectives[obj] - individuals[sorted[0]].objectives[obj];
        if !range.is_finite() || range.abs() < 1e-10 {
            continue;
        }
        for w in 1..(size - 1) {
            let prev = individuals[sorted[w - 1]].objectives[obj];
            let next = individuals[sorted[w + 1]].objectives[obj];
            individuals[sorted[w]].crowding_distance += (next - prev) / range;
        }
    }
}

/// Crowded comparison: lower rank first, then larger crowding distance.
pub fn crowded_comparison<T>(
    a: &MultiObjectiveIndividual<T>,
    b: &MultiObjectiveIndividual<T>,
) -> Ordering {
    a.rank
        .cmp(&b.rank)
        .then_with(|| b.crowding_distance.total_cmp(&a.crowding_distance))
}

/// Picks `k` survivors: whole fronts while they fit, the last one by crowding
/// distance. Returns indices into `individuals`, best first. Ties keep input
/// order, so the result is deterministic.
pub fn select_survivors<T>(
    individuals: &mut [MultiObjectiveIndividual<T>],
    directions: &[OptimizationDirection],
    k: usize,
) -> Vec<usize> {
    let fronts = fast_non_dominated_sort(individuals, directions);
    let mut chosen = Vec::with_capacity(k);
    for front in fronts {
        if chosen.len() >= k {
            break;
        }
        calculate_crowding_distance(individuals, &front);
        let mut ordered = front;
        ordered.sort_by(|&a, &b| crowded_comparison(&individuals[a], &individuals[b]).then(a.cmp(&b)));
        let room = k - chosen.len();
        chosen.extend(ordered.into_iter().take(room));
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominance_mixed() {
        // Score maximised, length minimised
        assert!(dominates(&[0.9, 1.0], &[0.8, 2.0], &SEARCH_OBJECTIVES));
        assert!(dominates(&[0.9, 1.0], &[0.9, 2.0], &SEARCH_OBJECTIVES));
        assert!(!dominates(&[0.9, 3.0], &[0.8, 2.0], &SEARCH_OBJECTIVES));
        assert!(!dominates(&[0.9, 2.0], &[0.9, 2.0], &SEARCH_OBJECTIVES));
    }

    #[test]
    fn test_fast_non_dominated_sort() {
        let directions = [OptimizationDirection::Maximize, OptimizationDirection::Maximize];
        let mut individuals = vec![
            MultiObjectiveIndividual::new(0, vec![1.0, 5.0]),
            MultiObjectiveIndividual::new(1, vec![3.0, 3.0]),
            MultiObjectiveIndividual::new(2, vec![5.0, 1.0]),
            MultiObjectiveIndividual::new(3, vec![2.0, 2.0]),
            MultiObjectiveIndividual::new(4, vec![1.0, 1.0]),
        ];

        let fronts = fast_non_dominated_sort(&mut individuals, &directions);

        assert_eq!(fronts.len(), 3);
        assert_eq!(fronts[0].len(), 3);
        assert_eq!(individuals[3].rank, 1);
        assert_eq!(individuals[4].rank, 2);
    }

    #[test]
    fn test_crowding_distance_boundaries() {
        let directions = [OptimizationDirection::Maximize, OptimizationDirection::Maximize];
        let mut individuals = vec![
            MultiObjectiveIndividual::new(0, vec![1.0, 5.0]),
            MultiObjectiveIndividual::new(1, vec![3.0, 3.0]),
            MultiObjectiveIndividual::new(2, vec![5.0, 1.0]),
        ];

        let fronts = fast_non_dominated_sort(&mut individuals, &directions);
        calculate_crowding_distance(&mut individuals, &fronts[0]);

        assert!(individuals[0].crowding_distance.is_infinite());
        assert!(individuals[2].crowding_distance.is_infinite());
        assert!(individuals[1].crowding_distance.is_finite());
    }

    #[test]
    fn test_select_survivors_prefers_first_front() {
        let mut individuals = vec![
            MultiObjectiveIndividual::new("long-weak", vec![0.5, 3.0]),
            MultiObjectiveIndividual::new("short-strong", vec![0.9, 1.0]),
            MultiObjectiveIndividual::new("long-strong", vec![0.95, 3.0]),
            MultiObjectiveIndividual::new("short-weak", vec![0.4, 1.0]),
        ];
        let survivors = select_survivors(&mut individuals, &SEARCH_OBJECTIVES, 2);
        let names: Vec<&str> = survivors.iter().map(|&i| individuals[i].data).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"short-strong"));
        assert!(names.contains(&"long-strong"));
    }
}
