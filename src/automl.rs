//! Public entry point: search, ensemble and predict under one time budget.

use crate::config::AppConfig;
use crate::data::dataset::output_classes;
use crate::data::{kfold, stratified_kfold, Dataset, LabelEncoder, MeanImputer};
use crate::engines::ensemble::{Ensemble, EnsembleBuilder, MemberSummary};
use crate::engines::evaluation::{EvaluationData, EvaluationScheduler};
use crate::engines::generation::{EvaluationCounts, EvolutionEngine, LogProgressCallback};
use crate::engines::metrics::Metric;
use crate::error::{AutopipeError, Result};
use crate::functions::{BuildContext, Catalog, ComponentRegistry};
use crate::types::Task;
use crate::utils::Stopwatch;
use chrono::{DateTime, Utc};
use log::{info, warn};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::Serialize;
use std::sync::Arc;

/// Serialisable summary of one `fit` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub task: Task,
    pub metric: Metric,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub generations: usize,
    pub evaluations: EvaluationCounts,
    pub best_pipeline: Option<String>,
    pub best_score: Option<f64>,
    pub ensemble: Vec<MemberSummary>,
    pub used_fallback: bool,
}

struct FittedModel {
    imputer: MeanImputer,
    encoder: Option<LabelEncoder>,
    ensemble: Ensemble,
    best_pipeline: Option<String>,
}

/// Searches for a pipeline on labelled data within `max_total_time_secs`
/// and predicts with an ensemble of the best ones found.
pub struct AutoPipeline {
    task: Task,
    config: AppConfig,
    metric: Metric,
    catalog: Arc<Catalog>,
    model: Option<FittedModel>,
    report: Option<SearchReport>,
}

impl AutoPipeline {
    /// Validates the configuration and builds the catalog. Every
    /// configuration problem surfaces here, before any search work.
    pub fn new(task: Task, config: AppConfig) -> Result<Self> {
        config.validate()?;
        let metric = config.evaluation.metric_for(task)?;
        let catalog = Catalog::from_registry(ComponentRegistry::new(), task, &config.catalog)?;
        Ok(Self {
            task,
            config,
            metric,
            catalog: Arc::new(catalog),
            model: None,
            report: None,
        })
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Features may contain NaN for missing values.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&SearchReport> {
        let dataset = Dataset::new(x.clone(), y.clone())?;
        self.fit_dataset(dataset)
    }

    /// Fits on every column of `df` except `target`.
    pub fn fit_dataframe(&mut self, df: &DataFrame, target: &str) -> Result<&SearchReport> {
        let dataset = Dataset::from_dataframe(df, target)?;
        self.fit_dataset(dataset)
    }

    fn fit_dataset(&mut self, dataset: Dataset) -> Result<&SearchReport> {
        let stopwatch = Stopwatch::start();
        let started_at = Utc::now();
        let total = self.config.search.max_total_time();
        let search_deadline =
            stopwatch.deadline_after(total.mul_f64(1.0 - self.config.ensemble.post_processing_fraction));
        let final_deadline = stopwatch.deadline_after(total);
        let evaluation = &self.config.evaluation;

        let missing = MeanImputer::missing_count(&dataset.x);
        if missing > 0 {
            info!("imputing {} missing feature value(s) with column means", missing);
        }
        let imputer = MeanImputer::fit(&dataset.x);
        let x = imputer.transform(&dataset.x)?;

        let (encoder, y) = match self.task {
            Task::Classification => {
                let encoder = LabelEncoder::fit(&dataset.y)?;
                let encoded = encoder.encode(&dataset.y)?;
                (Some(encoder), encoded)
            }
            Task::Regression => (None, dataset.y.clone()),
        };
        let build = BuildContext {
            task: self.task,
            n_classes: output_classes(self.task, encoder.as_ref()),
            random_state: evaluation.random_state,
        };
        let folds = match self.task {
            Task::Classification => {
                let classes: Vec<usize> = y.iter().map(|&c| c as usize).collect();
                stratified_kfold(&classes, evaluation.cv_folds, evaluation.random_state)?
            }
            Task::Regression => kfold(y.len(), evaluation.cv_folds, evaluation.random_state)?,
        };
        info!(
            "searching {} pipelines for {} samples x {} features, budget {:?}, metric {}",
            self.task,
            x.nrows(),
            x.ncols(),
            total,
            self.metric
        );

        let mut scheduler = EvaluationScheduler::new(
            Arc::clone(&self.catalog),
            EvaluationData {
                x: x.clone(),
                y: y.clone(),
                folds,
            },
            self.metric,
            build,
            evaluation.max_eval_time(),
            evaluation.n_jobs,
        )?;
        let mut engine = EvolutionEngine::new(
            Arc::clone(&self.catalog),
            self.config.search.clone(),
            evaluation.random_state,
        )
        .with_callback(Box::new(LogProgressCallback));
        let context = engine.run(&mut scheduler, &search_deadline)?;

        let best = context.hall_of_fame.best();
        match best {
            Some(best) => info!("best pipeline {} scored {:.5}", best.canonical, best.score),
            None => warn!("no pipeline was scored within the search budget"),
        }

        let ensemble = EnsembleBuilder::new(self.config.ensemble.clone(), self.metric, build).build(
            &context.hall_of_fame,
            &self.catalog,
            &x,
            &y,
            &final_deadline,
        )?;

        let report = SearchReport {
            task: self.task,
            metric: self.metric,
            started_at,
            elapsed_secs: stopwatch.elapsed().as_secs_f64(),
            generations: context.generation,
            evaluations: context.counts,
            best_pipeline: best.map(|b| b.canonical.clone()),
            best_score: best.map(|b| b.score),
            ensemble: ensemble.summary(),
            used_fallback: ensemble.is_fallback(),
        };
        info!(
            "fit finished in {:.2}s after {} evaluation(s)",
            report.elapsed_secs,
            report.evaluations.total()
        );

        self.model = Some(FittedModel {
            imputer,
            encoder,
            ensemble,
            best_pipeline: report.best_pipeline.clone(),
        });
        Ok(self.report.insert(report))
    }

    fn fitted(&self) -> Result<&FittedModel> {
        self.model.as_ref().ok_or(AutopipeError::NotFitted)
    }

    /// `(n_samples,)` predictions; class labels for classification
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self.fitted()?;
        let predictions = model.ensemble.predict(&model.imputer.transform(x)?)?;
        Ok(match &model.encoder {
            Some(encoder) => encoder.decode(&predictions),
            None => predictions,
        })
    }

    /// `(n_samples, n_classes)` probabilities, columns in ascending label order
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.task != Task::Classification {
            return Err(AutopipeError::Configuration(
                "predict_proba is only available for classification".to_string(),
            ));
        }
        let model = self.fitted()?;
        model.ensemble.predict_output(&model.imputer.transform(x)?)
    }

    /// Class labels in the column order of `predict_proba`
    pub fn classes(&self) -> Option<&[f64]> {
        self.model
            .as_ref()
            .and_then(|m| m.encoder.as_ref())
            .map(LabelEncoder::classes)
    }

    /// Canonical string of the best single pipeline found
    pub fn best_pipeline(&self) -> Option<&str> {
        self.model.as_ref().and_then(|m| m.best_pipeline.as_deref())
    }

    pub fn ensemble(&self) -> Option<&Ensemble> {
        self.model.as_ref().map(|m| &m.ensemble)
    }

    pub fn report(&self) -> Option<&SearchReport> {
        self.report.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use ndarray::array;

    #[test]
    fn test_configuration_errors_fail_fast() {
        let mut config = AppConfig::default();
        config.evaluation.metric = Some("r2".to_string());
        assert!(matches!(
            AutoPipeline::new(Task::Classification, config),
            Err(AutopipeError::Configuration(_))
        ));

        let mut config = AppConfig::default();
        config.search.max_total_time_secs = -1.0;
        assert!(matches!(
            AutoPipeline::new(Task::Regression, config),
            Err(AutopipeError::Configuration(_))
        ));

        let mut config = AppConfig::default();
        config.catalog.exclude = vec!["NoSuchComponent".to_string()];
        assert!(AutoPipeline::new(Task::Regression, config).is_err());

        let mut config = AppConfig::default();
        config.search.max_total_time_secs = 1e20;
        assert!(matches!(
            AutoPipeline::new(Task::Regression, config),
            Err(AutopipeError::Configuration(_))
        ));

        let mut config = AppConfig::default();
        config.catalog.params.insert(
            "Normalizer.norm".to_string(),
            vec![Value::String("l1".to_string()), Value::String("l1".to_string())],
        );
        assert!(matches!(
            AutoPipeline::new(Task::Classification, config),
            Err(AutopipeError::Configuration(_))
        ));
    }

    #[test]
    fn test_predict_before_fit() {
        let automl = AutoPipeline::new(Task::Regression, AppConfig::default()).unwrap();
        assert!(matches!(automl.predict(&array![[1.0]]), Err(AutopipeError::NotFitted)));
        assert!(automl.predict_proba(&array![[1.0]]).is_err());
        assert!(automl.report().is_none());
    }
}
