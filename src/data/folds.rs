use crate::error::{AutopipeError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Train/test row indices of one cross-validation fold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

fn effective_folds(n: usize, k: usize) -> Result<usize> {
    if n < 2 {
        return Err(AutopipeError::Data(format!(
            "cross-validation needs at least 2 samples, got {}",
            n
        )));
    }
    Ok(k.clamp(2, n))
}

fn folds_from_assignment(assignment: &[usize], k: usize) -> Vec<Fold> {
    (0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..assignment.len()).partition(|&i| assignment[i] == fold);
            Fold { train, test }
        })
        .filter(|f| !f.test.is_empty() && !f.train.is_empty())
        .collect()
}

/// Shuffled k-fold split of `n` rows
pub fn kfold(n: usize, k: usize, seed: u64) -> Result<Vec<Fold>> {
    let k = effective_folds(n, k)?;
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let mut assignment = vec![0; n];
    for (position, &row) in order.iter().enumerate() {
        assignment[row] = position % k;
    }
    Ok(folds_from_assignment(&assignment, k))
}

/// Shuffled k-fold split keeping class proportions roughly equal per fold.
/// Members of each class are dealt round-robin, continuing where the
/// previous class stopped so fold sizes stay balanced.
pub fn stratified_kfold(classes: &[usize], k: usize, seed: u64) -> Result<Vec<Fold>> {
    let k = effective_folds(classes.len(), k)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &class) in classes.iter().enumerate() {
        by_class.entry(class).or_default().push(row);
    }

    let mut assignment = vec![0; classes.len()];
    let mut next = 0;
    for members in by_class.values_mut() {
        members.shuffle(&mut rng);
        for &row in members.iter() {
            assignment[row] = next % k;
            next += 1;
        }
    }
    Ok(folds_from_assignment(&assignment, k))
}
