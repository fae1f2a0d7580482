use serde::Serialize;
use std::path::Path;
use tracing::{info, info_span};

use crate::cache::ModelCache;
use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::evaluation::{evaluate, EvaluationResult};
use crate::insight_core::{fit, ClassifierKind, FittedModel};
use crate::report::{assemble, Report};
use crate::split::{train_eval_split, Split};
use crate::stats::LabelBalance;
use crate::utils::AnalysisError;

/// Load, split, fit, evaluate and report in one sequential pass
#[derive(Debug, Clone)]
pub struct ClassificationPipeline {
    config: PipelineConfig,
    variants: Vec<ClassifierKind>,
    cache: Option<ModelCache>,
}

/// What a run produced, beyond the report itself
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub dataset: String,
    pub n_records: usize,
    pub n_train: usize,
    pub n_eval: usize,
    pub train_balance: LabelBalance,
    pub eval_balance: LabelBalance,
    /// Variants served from the model cache instead of being refit
    pub cached: Vec<ClassifierKind>,
    pub report: Report,
}

impl ClassificationPipeline {
    /// Create a pipeline that evaluates both variants
    ///
    /// # Returns
    /// * `Err(AnalysisError::ConfigError)` - If any parameter is out of range
    pub fn new(config: PipelineConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        let cache = config.cache_dir.clone().map(ModelCache::new);
        Ok(Self {
            config,
            variants: ClassifierKind::ALL.to_vec(),
            cache,
        })
    }

    /// Restrict the run to the given variants, in any order
    pub fn with_variants(mut self, variants: &[ClassifierKind]) -> Result<Self, AnalysisError> {
        if variants.is_empty() {
            return Err(AnalysisError::config("at least one classifier variant is required"));
        }
        let mut variants = variants.to_vec();
        variants.sort();
        variants.dedup();
        self.variants = variants;
        Ok(self)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the file at `path` and run every stage on it
    pub fn run<P: AsRef<Path>>(&self, path: P) -> Result<PipelineOutcome, AnalysisError> {
        let path = path.as_ref();
        let dataset = {
            let _span = info_span!("load", path = %path.display()).entered();
            Dataset::from_path(path, &self.config.data)?
        };
        self.run_on_dataset(&dataset)
    }

    /// Run split, fit, evaluate and report on an already loaded dataset
    pub fn run_on_dataset(&self, dataset: &Dataset) -> Result<PipelineOutcome, AnalysisError> {
        let _span = info_span!("pipeline", dataset = %dataset.name).entered();

        let (train, eval) = train_eval_split(dataset, &self.config.split)?;
        info!(train = train.len(), eval = eval.len(), "dataset split");

        let mut results: Vec<EvaluationResult> = Vec::with_capacity(self.variants.len());
        let mut cached = Vec::new();
        for &kind in &self.variants {
            let (model, from_cache) = self.fit_or_load(kind, &train)?;
            if from_cache {
                cached.push(kind);
            }
            results.push(evaluate(&model, &eval, self.config.importance)?);
        }

        let report = assemble(results);
        if let Some(best) = report.best() {
            info!(variant = %best.variant, accuracy = best.accuracy, "best variant");
        }

        Ok(PipelineOutcome {
            dataset: dataset.name.clone(),
            n_records: dataset.len(),
            n_train: train.len(),
            n_eval: eval.len(),
            train_balance: LabelBalance::compute(train.labels()),
            eval_balance: LabelBalance::compute(eval.labels()),
            cached,
            report,
        })
    }

    fn fit_or_load(&self, kind: ClassifierKind, train: &Split) -> Result<(FittedModel, bool), AnalysisError> {
        let model_config = &self.config.model;
        if let Some(model) = self.cache.as_ref().and_then(|c| c.load(kind, model_config, train)) {
            info!(variant = %kind, "using cached model");
            return Ok((model, true));
        }

        let model = fit(kind, train, model_config)?;
        if let Some(cache) = &self.cache {
            cache.store(model_config, train, &model);
        }
        Ok((model, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::ImportanceMethod;
    use ndarray::Array2;

    /// 200 rows: label is 1 when `rent` is below 100; `noise` is unrelated
    fn rent_dataset() -> Dataset {
        let n = 200;
        let mut values = Vec::with_capacity(n * 2);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let rent = i as f64;
            values.push(rent);
            values.push(((i * 37) % 11) as f64);
            labels.push(u8::from(rent < 100.0));
        }
        let features = Array2::from_shape_vec((n, 2), values).unwrap();
        Dataset::new("rent", vec!["rent".into(), "noise".into()], features, labels).unwrap()
    }

    fn small_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.model.ensemble.n_trees = 20;
        config
    }

    #[test]
    fn test_pipeline_evaluates_both_variants() {
        let pipeline = ClassificationPipeline::new(small_config()).unwrap();
        let outcome = pipeline.run_on_dataset(&rent_dataset()).unwrap();

        assert_eq!(outcome.n_train + outcome.n_eval, 200);
        assert_eq!(outcome.n_eval, 60);
        assert_eq!(outcome.report.entries.len(), 2);
        for entry in &outcome.report.entries {
            assert!(entry.accuracy >= 0.95, "{} accuracy {}", entry.variant, entry.accuracy);
            assert_eq!(entry.confusion.total(), 60);
            assert_eq!(entry.importances[0].feature, "rent");
        }
        assert!(outcome.cached.is_empty());
    }

    #[test]
    fn test_pipeline_single_variant() {
        let pipeline = ClassificationPipeline::new(small_config())
            .unwrap()
            .with_variants(&[ClassifierKind::Linear])
            .unwrap();
        let outcome = pipeline.run_on_dataset(&rent_dataset()).unwrap();
        assert_eq!(outcome.report.entries.len(), 1);
        assert_eq!(outcome.report.best().unwrap().variant, ClassifierKind::Linear);
    }

    #[test]
    fn test_pipeline_permutation_importance() {
        let config = PipelineConfig {
            importance: ImportanceMethod::Permutation { repeats: 3, seed: 5 },
            ..small_config()
        };
        let outcome = ClassificationPipeline::new(config)
            .unwrap()
            .run_on_dataset(&rent_dataset())
            .unwrap();
        for entry in &outcome.report.entries {
            assert_eq!(entry.importances[0].feature, "rent");
            assert!(matches!(entry.importance_method, ImportanceMethod::Permutation { .. }));
        }
    }

    #[test]
    fn test_pipeline_reuses_cached_models() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            ..small_config()
        };
        let pipeline = ClassificationPipeline::new(config).unwrap();
        let dataset = rent_dataset();

        let first = pipeline.run_on_dataset(&dataset).unwrap();
        let second = pipeline.run_on_dataset(&dataset).unwrap();

        assert!(first.cached.is_empty());
        assert_eq!(second.cached, ClassifierKind::ALL.to_vec());
        assert_eq!(first.report, second.report);
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let mut config = PipelineConfig::default();
        config.split.train_fraction = 0.0;
        assert!(ClassificationPipeline::new(config).is_err());
        assert!(ClassificationPipeline::new(PipelineConfig::default())
            .unwrap()
            .with_variants(&[])
            .is_err());
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let pipeline = ClassificationPipeline::new(PipelineConfig::default()).unwrap();
        let err = pipeline.run("/no/such/file.csv").unwrap_err();
        assert!(matches!(err, AnalysisError::LoadError(_)));
    }
}
