use crate::config::SearchConfig;
use crate::engines::evaluation::{EvaluatedIndividual, EvaluationScheduler, EvaluationState};
use crate::engines::generation::{
    hall_of_fame::HallOfFame,
    individual::Individual,
    operators::{cx_one_point, random_individual, random_valid_mutation},
    pareto::{select_survivors, MultiObjectiveIndividual, SEARCH_OBJECTIVES},
};
use crate::error::{AutopipeError, Result};
use crate::functions::Catalog;
use crate::utils::Deadline;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Attempts at producing an offspring not seen before, per offspring slot
const MAX_NOVELTY_RETRIES: usize = 10;

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: usize);
    fn on_generation_complete(&mut self, generation: usize, best_score: f64, hall_of_fame_size: usize);
    fn on_individuals_evaluated(&mut self, batch: usize, total: usize);
}

/// Evaluation outcomes over the whole search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationCounts {
    pub scored: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl EvaluationCounts {
    pub fn total(&self) -> usize {
        self.scored + self.failed + self.timed_out
    }
}

/// Mutable state of one search run
pub struct SearchContext {
    /// Current survivors, all scored
    pub population: Vec<EvaluatedIndividual>,
    pub hall_of_fame: HallOfFame,
    /// Every evaluated pipeline by canonical string
    pub cache: HashMap<String, EvaluatedIndividual>,
    pub generation: usize,
    pub counts: EvaluationCounts,
}

impl SearchContext {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            population: Vec::new(),
            hall_of_fame: HallOfFame::new(config.hall_of_fame_size, config.tie_break),
            cache: HashMap::new(),
            generation: 0,
            counts: EvaluationCounts::default(),
        }
    }

    pub fn best_score(&self) -> f64 {
        self.hall_of_fame
            .best()
            .map_or(f64::NEG_INFINITY, |best| best.score)
    }

    fn record(&mut self, results: &[EvaluatedIndividual]) {
        for result in results {
            match result.state {
                EvaluationState::Scored => self.counts.scored += 1,
                EvaluationState::TimedOut => self.counts.timed_out += 1,
                _ => self.counts.failed += 1,
            }
            self.hall_of_fame.try_add(result);
            self.cache
                .entry(result.canonical.clone())
                .or_insert_with(|| result.clone());
        }
    }
}

/// (mu + lambda) search over pipelines with NSGA-II survivor selection on
/// (score, pipeline length).
pub struct EvolutionEngine {
    catalog: Arc<Catalog>,
    config: SearchConfig,
    rng: StdRng,
    callback: Option<Box<dyn ProgressCallback>>,
}

impl EvolutionEngine {
    pub fn new(catalog: Arc<Catalog>, config: SearchConfig, seed: u64) -> Self {
        Self {
            catalog,
            config,
            rng: StdRng::seed_from_u64(seed),
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: Box<dyn ProgressCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Runs until `deadline` passes or `max_generations` is reached, and
    /// returns whatever was scored by then.
    pub fn run(&mut self, scheduler: &mut EvaluationScheduler, deadline: &Deadline) -> Result<SearchContext> {
        let mut ctx = SearchContext::new(&self.config);

        let initial = self.initial_population()?;
        info!("evaluating initial population of {}", initial.len());
        match self.evaluate(scheduler, &mut ctx, initial, deadline)? {
            Some(results) => {
                ctx.population = self.survivors(Vec::new(), results);
            }
            None => return Ok(ctx),
        }

        loop {
            if deadline.is_expired() {
                info!("search budget spent after {} generation(s)", ctx.generation);
                break;
            }
            if self
                .config
                .max_generations
                .is_some_and(|max| ctx.generation >= max)
            {
                info!("reached {} generation(s)", ctx.generation);
                break;
            }

            ctx.generation += 1;
            if let Some(callback) = self.callback.as_mut() {
                callback.on_generation_start(ctx.generation);
            }

            let offspring = self.offspring(&ctx)?;
            if offspring.is_empty() {
                info!("no unseen pipelines left to try, stopping the search");
                break;
            }
            let Some(results) = self.evaluate(scheduler, &mut ctx, offspring, deadline)? else {
                break;
            };
            let parents = std::mem::take(&mut ctx.population);
            ctx.population = self.survivors(parents, results);

            if let Some(callback) = self.callback.as_mut() {
                callback.on_generation_complete(ctx.generation, ctx.best_score(), ctx.hall_of_fame.len());
            }
        }
        Ok(ctx)
    }

    /// Evaluates a batch and records it; `None` once the budget is spent.
    fn evaluate(
        &mut self,
        scheduler: &mut EvaluationScheduler,
        ctx: &mut SearchContext,
        batch: Vec<Individual>,
        deadline: &Deadline,
    ) -> Result<Option<Vec<EvaluatedIndividual>>> {
        let results = match scheduler.evaluate(batch, deadline) {
            Ok(results) => results,
            Err(AutopipeError::BudgetExceeded(reason)) => {
                debug!("{}", reason);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        ctx.record(&results);
        if let Some(callback) = self.callback.as_mut() {
            callback.on_individuals_evaluated(results.len(), ctx.counts.total());
        }
        Ok(Some(results))
    }

    fn initial_population(&mut self) -> Result<Vec<Individual>> {
        let mut seen = HashSet::new();
        let mut population = Vec::with_capacity(self.config.population_size);
        for _ in 0..self.config.population_size {
            for _ in 0..MAX_NOVELTY_RETRIES {
                let candidate = random_individual(&self.catalog, self.config.max_pipeline_length, &mut self.rng)?;
                if seen.insert(candidate.canonical()) {
                    population.push(candidate);
                    break;
                }
            }
        }
        Ok(population)
    }

    /// Unseen offspring for one generation. Slots that stay duplicates after
    /// the retries are left empty.
    fn offspring(&mut self, ctx: &SearchContext) -> Result<Vec<Individual>> {
        let mut seen = HashSet::new();
        let mut batch = Vec::with_capacity(self.config.offspring_size);
        for _ in 0..self.config.offspring_size {
            for _ in 0..MAX_NOVELTY_RETRIES {
                let candidate = self.vary(&ctx.population)?;
                let canonical = candidate.canonical();
                if !ctx.cache.contains_key(&canonical) && seen.insert(canonical) {
                    batch.push(candidate);
                    break;
                }
            }
        }
        Ok(batch)
    }

    /// One child by crossover or mutation of uniformly drawn parents
    fn vary(&mut self, population: &[EvaluatedIndividual]) -> Result<Individual> {
        let max_length = self.config.max_pipeline_length;
        let Some(parent) = population.choose(&mut self.rng) else {
            return random_individual(&self.catalog, max_length, &mut self.rng);
        };

        if population.len() >= 2 && self.rng.gen_bool(self.config.crossover_probability) {
            if let Some(other) = population.choose(&mut self.rng) {
                if let Some((child, _)) =
                    cx_one_point(&parent.individual, &other.individual, max_length, &mut self.rng)?
                {
                    return Ok(child);
                }
            }
        }

        let mut child = parent.individual.clone();
        match random_valid_mutation(
            &mut child,
            &self.catalog,
            &self.config.mutation_weights,
            max_length,
            &mut self.rng,
        )? {
            Some(_) => Ok(child),
            None => random_individual(&self.catalog, max_length, &mut self.rng),
        }
    }

    /// Best `population_size` of parents and scored offspring
    fn survivors(
        &self,
        parents: Vec<EvaluatedIndividual>,
        offspring: Vec<EvaluatedIndividual>,
    ) -> Vec<EvaluatedIndividual> {
        let pool: Vec<EvaluatedIndividual> = parents
            .into_iter()
            .chain(offspring.into_iter().filter(|o| o.is_scored()))
            .collect();
        let mut ranked: Vec<MultiObjectiveIndividual<usize>> = pool
            .iter()
            .enumerate()
            .map(|(i, member)| MultiObjectiveIndividual::new(i, member.objectives()))
            .collect();
        let chosen = select_survivors(&mut ranked, &SEARCH_OBJECTIVES, self.config.population_size);

        let mut slots: Vec<Option<EvaluatedIndividual>> = pool.into_iter().map(Some).collect();
        chosen
            .into_iter()
            .filter_map(|i| slots[ranked[i].data].take())
            .collect()
    }
}
