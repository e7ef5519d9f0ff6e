use super::compiler::compile_individual;
use crate::data::Fold;
use crate::engines::generation::individual::Individual;
use crate::engines::metrics::Metric;
use crate::error::{AutopipeError, Result};
use crate::functions::traits::{BuildContext, Estimator, FitContext, Interrupted};
use crate::functions::Catalog;
use crate::utils::Deadline;
use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of one evaluation. Only `Scored` carries a usable score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationState {
    Pending,
    Compiling,
    Evaluating,
    Scored,
    Failed(String),
    TimedOut,
}

/// An individual together with the outcome of evaluating it
#[derive(Debug, Clone)]
pub struct EvaluatedIndividual {
    pub individual: Individual,
    pub canonical: String,
    pub state: EvaluationState,
    /// Oriented cross-validation score; `-inf` unless scored
    pub score: f64,
    /// Out-of-fold output, kept for ensemble construction
    pub oof: Option<Arc<Array2<f64>>>,
    pub evaluation_id: usize,
    pub duration: Duration,
}

impl EvaluatedIndividual {
    pub fn pending(individual: Individual, evaluation_id: usize) -> Self {
        Self {
            canonical: individual.canonical(),
            individual,
            state: EvaluationState::Pending,
            score: f64::NEG_INFINITY,
            oof: None,
            evaluation_id,
            duration: Duration::ZERO,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.state == EvaluationState::Scored
    }

    /// Number of pipeline stages
    pub fn length(&self) -> usize {
        self.individual.primitive_count()
    }

    /// `[score, length]`, matching the search objectives
    pub fn objectives(&self) -> Vec<f64> {
        vec![self.score, self.length() as f64]
    }

    fn fail(&mut self, reason: String) {
        self.state = EvaluationState::Failed(reason);
        self.score = f64::NEG_INFINITY;
        self.oof = None;
    }
}

/// Training data and folds shared by every evaluation
pub struct EvaluationData {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub folds: Vec<Fold>,
}

/// Evaluates batches of individuals by k-fold cross-validation on a worker
/// pool. Every evaluation gets a deadline no later than the search deadline;
/// failures and time-outs are recorded on the individual and never abort the
/// batch.
pub struct EvaluationScheduler {
    catalog: Arc<Catalog>,
    data: Arc<EvaluationData>,
    metric: Metric,
    build: BuildContext,
    max_eval_time: Option<Duration>,
    pool: ThreadPool,
    next_id: usize,
}

impl EvaluationScheduler {
    pub fn new(
        catalog: Arc<Catalog>,
        data: EvaluationData,
        metric: Metric,
        build: BuildContext,
        max_eval_time: Option<Duration>,
        n_jobs: usize,
    ) -> Result<Self> {
        if data.folds.is_empty() {
            return Err(AutopipeError::Data("no cross-validation folds".to_string()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_jobs)
            .thread_name(|i| format!("autopipe-eval-{}", i))
            .build()
            .map_err(|e| AutopipeError::Configuration(format!("Failed to start worker pool: {}", e)))?;
        info!(
            "evaluating with {} worker(s), {} folds, metric {}",
            pool.current_num_threads(),
            data.folds.len(),
            metric
        );
        Ok(Self {
            catalog,
            data: Arc::new(data),
            metric,
            build,
            max_eval_time,
            pool,
            next_id: 0,
        })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Total evaluations dispatched so far
    pub fn evaluations(&self) -> usize {
        self.next_id
    }

    /// Evaluates `individuals` and returns them in input order.
    ///
    /// Fails with `BudgetExceeded` when the deadline has already passed and
    /// with `Structural` when an individual is not a valid tree.
    pub fn evaluate(
        &mut self,
        individuals: Vec<Individual>,
        deadline: &Deadline,
    ) -> Result<Vec<EvaluatedIndividual>> {
        if deadline.is_expired() {
            return Err(AutopipeError::BudgetExceeded(format!(
                "deadline passed before {} evaluation(s) could start",
                individuals.len()
            )));
        }

        let mut batch = Vec::with_capacity(individuals.len());
        for individual in individuals {
            batch.push(EvaluatedIndividual::pending(individual, self.next_id));
            self.next_id += 1;
        }

        for item in batch.iter_mut() {
            item.state = EvaluationState::Compiling;
            match compile_individual(&item.individual, &self.catalog, &self.build) {
                Ok(_) => item.state = EvaluationState::Evaluating,
                Err(AutopipeError::Compile(reason)) => {
                    warn!("{} does not compile: {}", item.canonical, reason);
                    item.fail(reason);
                }
                Err(e) => return Err(e),
            }
        }

        let this = &*self;
        this.pool.install(|| {
            batch
                .par_iter_mut()
                .filter(|item| item.state == EvaluationState::Evaluating)
                .for_each(|item| this.run(item, deadline));
        });

        let scored = batch.iter().filter(|i| i.is_scored()).count();
        let timed_out = batch
            .iter()
            .filter(|i| i.state == EvaluationState::TimedOut)
            .count();
        debug!(
            "batch of {}: {} scored, {} timed out, {} failed",
            batch.len(),
            scored,
            timed_out,
            batch.len() - scored - timed_out
        );
        Ok(batch)
    }

    fn run(&self, item: &mut EvaluatedIndividual, deadline: &Deadline) {
        if deadline.is_expired() {
            item.state = EvaluationState::TimedOut;
            item.score = f64::NEG_INFINITY;
            return;
        }
        let slice = deadline.child(self.max_eval_time);
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.cross_validate(&item.individual, &slice)));
        item.duration = started.elapsed();

        match outcome {
            Ok(Ok((score, oof))) if score.is_finite() => {
                item.state = EvaluationState::Scored;
                item.score = score;
                item.oof = Some(Arc::new(oof));
                debug!("{} scored {:.5} in {:?}", item.canonical, score, item.duration);
            }
            Ok(Ok((score, _))) => item.fail(format!("non-finite score {}", score)),
            Ok(Err(e)) if e.downcast_ref::<Interrupted>().is_some() => {
                item.state = EvaluationState::TimedOut;
                item.score = f64::NEG_INFINITY;
                debug!("{} timed out after {:?}", item.canonical, item.duration);
            }
            Ok(Err(e)) => {
                debug!("{} failed: {:#}", item.canonical, e);
                item.fail(format!("{:#}", e));
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                warn!("{} panicked: {}", item.canonical, reason);
                item.fail(format!("panic: {}", reason));
            }
        }
    }

    /// Oriented score and out-of-fold output of one individual
    fn cross_validate(&self, individual: &Individual, deadline: &Deadline) -> anyhow::Result<(f64, Array2<f64>)> {
        let ctx = FitContext::new(deadline.clone());
        let data = &self.data;
        let width = self.build.output_width();
        let mut oof = Array2::from_elem((data.y.len(), width), f64::NAN);

        for fold in &data.folds {
            ctx.check()?;
            let mut pipeline = compile_individual(individual, &self.catalog, &self.build)?;
            let x_train = data.x.select(Axis(0), &fold.train);
            let y_train = data.y.select(Axis(0), &fold.train);
            pipeline.fit(&x_train, &y_train, &ctx)?;

            let output = pipeline.predict_output(&data.x.select(Axis(0), &fold.test))?;
            if output.dim() != (fold.test.len(), width) {
                anyhow::bail!(
                    "pipeline produced output of shape {:?}, expected ({}, {})",
                    output.dim(),
                    fold.test.len(),
                    width
                );
            }
            for (row, &sample) in fold.test.iter().enumerate() {
                oof.row_mut(sample).assign(&output.row(row));
            }
        }

        Ok((self.metric.oriented_score(&data.y, &oof), oof))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
