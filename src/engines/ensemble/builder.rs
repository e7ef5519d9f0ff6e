use super::{Ensemble, EnsembleMember};
use crate::config::{EnsembleConfig, Weighting};
use crate::engines::evaluation::{compile_individual, EvaluatedIndividual};
use crate::engines::generation::HallOfFame;
use crate::engines::metrics::Metric;
use crate::error::{AutopipeError, Result};
use crate::functions::traits::{BuildContext, Estimator, FitContext};
use crate::functions::Catalog;
use crate::utils::Deadline;
use anyhow::anyhow;
use log::{info, warn};
use ndarray::{Array1, Array2};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Turns the hall of fame into the final predictor
pub struct EnsembleBuilder {
    config: EnsembleConfig,
    metric: Metric,
    build: BuildContext,
}

impl EnsembleBuilder {
    pub fn new(config: EnsembleConfig, metric: Metric, build: BuildContext) -> Self {
        Self { config, metric, build }
    }

    /// Up to `auto_ensemble_n` scored candidates, best first, skipping any
    /// whose out-of-fold output matches one already chosen.
    pub fn select_candidates<'a>(&self, ranked: &'a [EvaluatedIndividual]) -> Vec<&'a EvaluatedIndividual> {
        let mut chosen: Vec<&EvaluatedIndividual> = Vec::new();
        for candidate in ranked.iter().filter(|c| c.is_scored()) {
            if chosen.len() >= self.config.auto_ensemble_n {
                break;
            }
            let Some(oof) = &candidate.oof else {
                continue;
            };
            if chosen.iter().any(|c| c.oof.as_deref() == Some(&**oof)) {
                continue;
            }
            chosen.push(candidate);
        }
        chosen
    }

    /// Member weights, aligned with `candidates`. Zero means left out.
    pub fn weights(&self, candidates: &[&EvaluatedIndividual], y: &Array1<f64>) -> Vec<f64> {
        match self.config.weighting {
            Weighting::Uniform => vec![1.0; candidates.len()],
            Weighting::Greedy => {
                let oofs: Vec<&Array2<f64>> = candidates
                    .iter()
                    .filter_map(|c| c.oof.as_deref())
                    .collect();
                if oofs.len() != candidates.len() {
                    return vec![1.0; candidates.len()];
                }
                greedy_weights(&oofs, y, self.metric, 2 * candidates.len())
            }
        }
    }

    /// Refits the selected candidates on `(x, y)` before `deadline`. When none
    /// can be refit, the ensemble is the registry's baseline estimator.
    pub fn build(
        &self,
        hall_of_fame: &HallOfFame,
        catalog: &Catalog,
        x: &Array2<f64>,
        y: &Array1<f64>,
        deadline: &Deadline,
    ) -> Result<Ensemble> {
        let candidates = self.select_candidates(hall_of_fame.get_all());
        let weights = self.weights(&candidates, y);

        let mut members = Vec::new();
        for (candidate, weight) in candidates.iter().zip(weights) {
            if weight <= 0.0 {
                continue;
            }
            if deadline.is_expired() {
                warn!("no time left to refit {}", candidate.canonical);
                break;
            }
            match self.refit(candidate, catalog, x, y, deadline) {
                Ok(model) => members.push(EnsembleMember::new(
                    candidate.canonical.clone(),
                    weight,
                    candidate.score,
                    model,
                )),
                Err(e) => warn!("dropping {} from the ensemble: {:#}", candidate.canonical, e),
            }
        }

        let width = self.build.output_width();
        if members.is_empty() {
            warn!("no searched pipeline could be refit, using the baseline estimator");
            let mut model = catalog.registry().fallback(&self.build);
            model
                .fit(x, y, &FitContext::unbounded())
                .map_err(|e| AutopipeError::Evaluation(format!("baseline estimator: {:#}", e)))?;
            let baseline = EnsembleMember::new("DummyEstimator", 1.0, f64::NEG_INFINITY, model);
            return Ensemble::new(self.build.task, width, vec![baseline], true);
        }

        info!(
            "ensemble of {} member(s) from {} candidate(s)",
            members.len(),
            candidates.len()
        );
        Ensemble::new(self.build.task, width, members, false)
    }

    fn refit(
        &self,
        candidate: &EvaluatedIndividual,
        catalog: &Catalog,
        x: &Array2<f64>,
        y: &Array1<f64>,
        deadline: &Deadline,
    ) -> anyhow::Result<Box<dyn Estimator>> {
        let mut pipeline = compile_individual(&candidate.individual, catalog, &self.build)?;
        let ctx = FitContext::new(deadline.clone());
        catch_unwind(AssertUnwindSafe(|| pipeline.fit(x, y, &ctx)))
            .map_err(|_| anyhow!("panicked during refit"))??;
        Ok(Box::new(pipeline))
    }
}

/// Forward selection with replacement: each round adds the member that most
/// improves the score of the averaged output, stopping when no addition
/// helps. Returns selection counts.
pub fn greedy_weights(oofs: &[&Array2<f64>], y: &Array1<f64>, metric: Metric, rounds: usize) -> Vec<f64> {
    let mut counts = vec![0.0; oofs.len()];
    let Some(first) = oofs.first() else {
        return counts;
    };
    let mut sum = Array2::<f64>::zeros(first.dim());
    let mut selected = 0.0;
    let mut current = f64::NEG_INFINITY;

    for _ in 0..rounds {
        let mut best: Option<(usize, f64)> = None;
        for (i, oof) in oofs.iter().enumerate() {
            if oof.dim() != sum.dim() {
                continue;
            }
            let averaged = (&sum + *oof) / (selected + 1.0);
            let score = metric.oriented_score(y, &averaged);
            if best.map_or(score.is_finite(), |(_, b)| score > b) {
                best = Some((i, score));
            }
        }
        match best {
            Some((i, score)) if score > current => {
                counts[i] += 1.0;
                sum += oofs[i];
                selected += 1.0;
                current = score;
            }
            _ => break,
        }
    }

    if selected == 0.0 {
        return vec![1.0; oofs.len()];
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::engines::evaluation::EvaluationState;
    use crate::engines::generation::{parse_individual, TieBreak};
    use crate::functions::ComponentRegistry;
    use crate::types::Task;
    use ndarray::array;
    use std::sync::Arc;
    use std::time::Duration;

    fn catalog() -> Catalog {
        Catalog::from_registry(ComponentRegistry::new(), Task::Regression, &CatalogConfig::default()).unwrap()
    }

    fn build_ctx() -> BuildContext {
        BuildContext {
            task: Task::Regression,
            n_classes: 1,
            random_state: 0,
        }
    }

    fn scored(catalog: &Catalog, source: &str, score: f64, oof: Array2<f64>, id: usize) -> EvaluatedIndividual {
        let mut evaluated = EvaluatedIndividual::pending(parse_individual(source, catalog).unwrap(), id);
        evaluated.state = EvaluationState::Scored;
        evaluated.score = score;
        evaluated.oof = Some(Arc::new(oof));
        evaluated
    }

    #[test]
    fn test_greedy_combines_complementary_members() {
        let y = array![0.0, 1.0, 2.0, 3.0];
        let high = (&y + 1.0).insert_axis(ndarray::Axis(1));
        let low = (&y - 1.0).insert_axis(ndarray::Axis(1));
        let weights = greedy_weights(&[&high, &low], &y, Metric::MeanSquaredError, 4);
        assert_eq!(weights, vec![1.0, 1.0]);
    }

    #[test]
    fn test_greedy_stops_at_perfect_member() {
        let y = array![0.0, 1.0, 2.0];
        let exact = y.clone().insert_axis(ndarray::Axis(1));
        let off = (&y * 2.0).insert_axis(ndarray::Axis(1));
        let weights = greedy_weights(&[&off, &exact], &y, Metric::MeanSquaredError, 4);
        assert_eq!(weights, vec![0.0, 1.0]);
    }

    #[test]
    fn test_selection_drops_behavioural_duplicates() {
        let catalog = catalog();
        let same = array![[1.0], [2.0]];
        let ranked = vec![
            scored(&catalog, "RidgeRegression(data, RidgeRegression.alpha=1.0)", -1.0, same.clone(), 0),
            scored(&catalog, "RidgeRegression(StandardScaler(data), RidgeRegression.alpha=1.0)", -1.0, same, 1),
            scored(&catalog, "RidgeRegression(data, RidgeRegression.alpha=10.0)", -2.0, array![[0.0], [2.0]], 2),
        ];
        let builder = EnsembleBuilder::new(EnsembleConfig::default(), Metric::MeanSquaredError, build_ctx());
        let chosen = builder.select_candidates(&ranked);
        let ids: Vec<usize> = chosen.iter().map(|c| c.evaluation_id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_empty_hall_of_fame_falls_back_to_baseline() {
        let catalog = catalog();
        let builder = EnsembleBuilder::new(EnsembleConfig::default(), Metric::MeanSquaredError, build_ctx());
        let hof = HallOfFame::new(10, TieBreak::default());
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 6.0];
        let ensemble = builder
            .build(&hof, &catalog, &x, &y, &Deadline::after(Duration::from_secs(10)))
            .unwrap();
        assert!(ensemble.is_fallback());
        assert_eq!(ensemble.predict(&x).unwrap(), array![3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_builds_refit_members() {
        let catalog = catalog();
        let mut hof = HallOfFame::new(10, TieBreak::default());
        hof.try_add(&scored(
            &catalog,
            "RidgeRegression(data, RidgeRegression.alpha=0.001)",
            -0.1,
            array![[1.0], [2.0], [3.0], [4.0]],
            0,
        ));
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let builder = EnsembleBuilder::new(EnsembleConfig::default(), Metric::MeanSquaredError, build_ctx());
        let ensemble = builder
            .build(&hof, &catalog, &x, &y, &Deadline::after(Duration::from_secs(10)))
            .unwrap();
        assert!(!ensemble.is_fallback());
        assert_eq!(ensemble.members().len(), 1);
        let predictions = ensemble.predict(&x).unwrap();
        assert!((predictions[3] - 8.0).abs() < 1e-2);
    }
}
