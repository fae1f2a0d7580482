use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, info_span};

use super::forest::{FittedForest, ForestConfig};
use super::logistic::{FittedLogistic, LogisticConfig};
use crate::split::Split;
use crate::utils::{validate_cutoff, AnalysisError};

/// The two interchangeable classifier variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Logistic regression
    Linear,
    /// Bootstrap-aggregated decision trees
    Ensemble,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 2] = [ClassifierKind::Linear, ClassifierKind::Ensemble];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::Linear => "linear",
            ClassifierKind::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One predictor's importance score and its 1-based rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub score: f64,
    pub rank: usize,
}

/// Rank predictors by score, highest first
///
/// Equal scores keep schema order.
pub fn rank_importances(names: &[String], scores: &[f64]) -> Vec<FeatureImportance> {
    let mut order: Vec<usize> = (0..names.len().min(scores.len())).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
        .into_iter()
        .enumerate()
        .map(|(pos, idx)| FeatureImportance {
            feature: names[idx].clone(),
            score: scores[idx],
            rank: pos + 1,
        })
        .collect()
}

/// Read-only interface over a fitted classifier
pub trait Classifier {
    fn kind(&self) -> ClassifierKind;

    /// Predictor names the model was fitted on, in column order
    fn feature_names(&self) -> &[String];

    /// Probability threshold; a probability equal to the cutoff predicts positive
    fn cutoff(&self) -> f64;

    /// Probability of the positive class for each row
    fn predict_proba(&self, records: ArrayView2<f64>) -> Vec<f64>;

    /// Unranked intrinsic importance, one score per predictor
    fn raw_importance(&self) -> Vec<f64>;

    /// Size of the fitted model, used to break accuracy ties
    fn cost(&self) -> usize;

    fn predict(&self, records: ArrayView2<f64>) -> Vec<u8> {
        let cutoff = self.cutoff();
        self.predict_proba(records)
            .into_iter()
            .map(|p| u8::from(p >= cutoff))
            .collect()
    }

    fn feature_importance(&self) -> Vec<FeatureImportance> {
        rank_importances(self.feature_names(), &self.raw_importance())
    }
}

/// A variant's hyperparameters, able to fit that variant on a training split
pub trait ClassifierAdapter {
    type Fitted: Classifier;

    fn kind(&self) -> ClassifierKind;

    /// Reject hyperparameters that cannot produce a model
    fn validate(&self) -> Result<(), AnalysisError>;

    fn fit(&self, train: &Split, cutoff: f64, seed: u64) -> Result<Self::Fitted, AnalysisError>;
}

/// Hyperparameters for both variants plus the shared cutoff and seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub cutoff: f64,
    pub seed: u64,
    pub linear: LogisticConfig,
    pub ensemble: ForestConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            cutoff: 0.5,
            seed: 42,
            linear: LogisticConfig::default(),
            ensemble: ForestConfig::default(),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        validate_cutoff(self.cutoff)?;
        self.linear.validate()?;
        self.ensemble.validate()
    }

    /// Serialized hyperparameters that determine the fitted model for `kind`
    pub fn fingerprint(&self, kind: ClassifierKind) -> String {
        let variant = match kind {
            ClassifierKind::Linear => serde_json::to_string(&self.linear),
            ClassifierKind::Ensemble => serde_json::to_string(&self.ensemble),
        }
        .unwrap_or_default();
        format!("{}|cutoff={}|seed={}|{}", kind, self.cutoff, self.seed, variant)
    }
}

/// A fitted variant; never mutated after fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum FittedModel {
    Linear(FittedLogistic),
    Ensemble(FittedForest),
}

impl FittedModel {
    fn inner(&self) -> &dyn Classifier {
        match self {
            FittedModel::Linear(model) => model,
            FittedModel::Ensemble(model) => model,
        }
    }
}

impl Classifier for FittedModel {
    fn kind(&self) -> ClassifierKind {
        self.inner().kind()
    }

    fn feature_names(&self) -> &[String] {
        self.inner().feature_names()
    }

    fn cutoff(&self) -> f64 {
        self.inner().cutoff()
    }

    fn predict_proba(&self, records: ArrayView2<f64>) -> Vec<f64> {
        self.inner().predict_proba(records)
    }

    fn raw_importance(&self) -> Vec<f64> {
        self.inner().raw_importance()
    }

    fn cost(&self) -> usize {
        self.inner().cost()
    }
}

/// Fit one variant on a training split
///
/// # Returns
/// * `Ok(model)` - Fitted model
/// * `Err(AnalysisError::ConfigError)` - If the cutoff or variant hyperparameters are invalid
/// * `Err(AnalysisError::FitError)` - If the split is empty, single-class or non-finite
pub fn fit(kind: ClassifierKind, train: &Split, config: &ModelConfig) -> Result<FittedModel, AnalysisError> {
    validate_cutoff(config.cutoff)?;
    let _span = info_span!("fit", variant = %kind, records = train.len()).entered();

    let model = match kind {
        ClassifierKind::Linear => {
            FittedModel::Linear(config.linear.fit(train, config.cutoff, config.seed)?)
        }
        ClassifierKind::Ensemble => {
            FittedModel::Ensemble(config.ensemble.fit(train, config.cutoff, config.seed)?)
        }
    };

    info!(cost = model.cost(), "model fitted");
    Ok(model)
}
