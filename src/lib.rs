//! SNAP Insight Engine - food-stamp recipiency classification over census housing data
//!
//! This library loads a delimited census extract, splits it into training and
//! evaluation subsets, fits a logistic-regression and a bagged-tree classifier,
//! scores both on held-out records and assembles a ranked comparison report.

pub mod cache;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod evaluation;
pub mod insight_core;
pub mod report;
pub mod split;
pub mod stats;
pub mod utils;

pub use cache::ModelCache;
pub use config::PipelineConfig;
pub use dataset::{Dataset, LoadOptions, MissingPolicy, Record};
pub use engine::{ClassificationPipeline, PipelineOutcome};
pub use evaluation::{evaluate, ConfusionMatrix, EvaluationResult, ImportanceMethod};
pub use insight_core::{fit, Classifier, ClassifierKind, FeatureImportance, FittedModel, ModelConfig};
pub use report::{assemble, Report};
pub use split::{train_eval_split, Split, SplitConfig};
pub use stats::{describe, LabelBalance, Statistics};
pub use utils::AnalysisError;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, AnalysisError>;
