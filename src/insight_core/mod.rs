/// Classifier variants and their shared interface
pub mod feature;
pub mod forest;
pub mod logistic;
pub mod model;
pub mod tree;

// Re-export commonly used items
pub use forest::{FittedForest, ForestConfig};
pub use logistic::{FittedLogistic, LogisticConfig};
pub use model::{
    fit, rank_importances, Classifier, ClassifierAdapter, ClassifierKind, FeatureImportance,
    FittedModel, ModelConfig,
};
