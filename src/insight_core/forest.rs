//! Bootstrap-aggregated classification trees.
//!
//! Every tree is grown on a bootstrap resample of the training split, drawn
//! with a ChaCha RNG seeded from `seed + tree_index`, so a forest is fully
//! determined by its config, seed and training rows.

use ndarray::ArrayView2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::feature::validate_training;
use super::model::{Classifier, ClassifierAdapter, ClassifierKind};
use super::tree::{DecisionTree, TreeParams};
use crate::split::Split;
use crate::utils::{normalize_to_unit_sum, validate_nonzero, AnalysisError};

/// Bagged tree ensemble hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// Candidate predictors per split; `None` uses every predictor (plain bagging)
    pub max_features: Option<usize>,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_features: None,
            max_depth: None,
            min_samples_leaf: 1,
        }
    }
}

/// Fitted tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedForest {
    feature_names: Vec<String>,
    trees: Vec<DecisionTree>,
    cutoff: f64,
    impurity_importance: Vec<f64>,
    oob_accuracy: Option<f64>,
}

impl FittedForest {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Accuracy of each training row scored only by trees that did not see it
    ///
    /// `None` when no row was ever left out of a bootstrap sample.
    pub fn oob_accuracy(&self) -> Option<f64> {
        self.oob_accuracy
    }
}

impl Classifier for FittedForest {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Ensemble
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Share of trees voting positive
    fn predict_proba(&self, records: ArrayView2<f64>) -> Vec<f64> {
        let n_trees = self.trees.len() as f64;
        records
            .rows()
            .into_iter()
            .map(|row| {
                let votes: usize = self.trees.iter().map(|t| usize::from(t.predict_row(row))).sum();
                votes as f64 / n_trees
            })
            .collect()
    }

    /// Mean decrease in Gini impurity, normalized to sum to 1
    fn raw_importance(&self) -> Vec<f64> {
        self.impurity_importance.clone()
    }

    fn cost(&self) -> usize {
        self.trees.iter().map(DecisionTree::n_nodes).sum()
    }
}

impl ForestConfig {
    fn candidate_count(&self, n_features: usize) -> usize {
        self.max_features.unwrap_or(n_features)
    }
}

impl ClassifierAdapter for ForestConfig {
    type Fitted = FittedForest;

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Ensemble
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        validate_nonzero("n_trees", self.n_trees)?;
        validate_nonzero("min_samples_leaf", self.min_samples_leaf)?;
        if let Some(max_features) = self.max_features {
            validate_nonzero("max_features", max_features)?;
        }
        if let Some(max_depth) = self.max_depth {
            validate_nonzero("max_depth", max_depth)?;
        }
        Ok(())
    }

    fn fit(&self, train: &Split, cutoff: f64, seed: u64) -> Result<FittedForest, AnalysisError> {
        self.validate()?;
        validate_training(train.features(), train.labels())?;

        let features = train.features();
        let labels = train.labels();
        let (n_samples, n_features) = features.dim();

        let max_features = self.candidate_count(n_features);
        if max_features > n_features {
            return Err(AnalysisError::config(format!(
                "max_features ({}) cannot exceed number of predictors ({})",
                max_features, n_features
            )));
        }
        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            max_features,
        };

        let mut trees = Vec::with_capacity(self.n_trees);
        let mut importances = vec![0.0; n_features];
        // per-row [negative votes, positive votes] from trees that left the row out
        let mut oob_votes = vec![[0usize; 2]; n_samples];

        for tree_idx in 0..self.n_trees {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(tree_idx as u64));
            let bootstrap: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();

            let mut in_bag = vec![false; n_samples];
            for &idx in &bootstrap {
                in_bag[idx] = true;
            }

            let tree = DecisionTree::fit(features, labels, bootstrap, params, &mut rng, &mut importances);

            for (idx, _) in in_bag.iter().enumerate().filter(|&(_, &seen)| !seen) {
                let vote = tree.predict_row(features.row(idx));
                oob_votes[idx][usize::from(vote)] += 1;
            }
            trees.push(tree);
        }

        let mut oob_scored = 0usize;
        let mut oob_correct = 0usize;
        for (idx, votes) in oob_votes.iter().enumerate() {
            let total = votes[0] + votes[1];
            if total == 0 {
                continue;
            }
            oob_scored += 1;
            let predicted = u8::from(votes[1] as f64 / total as f64 >= cutoff);
            if predicted == labels[idx] {
                oob_correct += 1;
            }
        }
        let oob_accuracy = (oob_scored > 0).then(|| oob_correct as f64 / oob_scored as f64);

        debug!(
            trees = trees.len(),
            max_features,
            oob_accuracy = oob_accuracy.unwrap_or(f64::NAN),
            "forest grown"
        );

        Ok(FittedForest {
            feature_names: train.feature_names().to_vec(),
            trees,
            cutoff,
            impurity_importance: normalize_to_unit_sum(&importances),
            oob_accuracy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use ndarray::Array2;

    /// 60 rows: `signal` separates the classes at 30, `noise` cycles 0..5
    fn separable_split() -> Split {
        let n = 60;
        let mut values = Vec::with_capacity(n * 2);
        for i in 0..n {
            values.push(i as f64);
            values.push((i % 5) as f64);
        }
        let features = Array2::from_shape_vec((n, 2), values).unwrap();
        let labels = (0..n).map(|i| u8::from(i >= 30)).collect();
        let dataset = Dataset::new("forest", vec!["signal".into(), "noise".into()], features, labels).unwrap();
        Split::from_indices(&dataset, (0..n).collect())
    }

    #[test]
    fn test_forest_fits_separable_data() {
        let train = separable_split();
        let config = ForestConfig {
            n_trees: 15,
            ..ForestConfig::default()
        };
        let model = config.fit(&train, 0.5, 42).unwrap();

        assert_eq!(model.n_trees(), 15);
        let predictions = model.predict(train.features());
        let correct = predictions
            .iter()
            .zip(train.labels())
            .filter(|(p, l)| p == l)
            .count();
        assert!(correct as f64 / train.len() as f64 >= 0.95);
        assert!(model.oob_accuracy().unwrap() > 0.9);
    }

    #[test]
    fn test_forest_importance_ranks_signal_first() {
        let train = separable_split();
        let model = ForestConfig {
            n_trees: 10,
            ..ForestConfig::default()
        }
        .fit(&train, 0.5, 3)
        .unwrap();

        let ranked = model.feature_importance();
        assert_eq!(ranked[0].feature, "signal");
        let total: f64 = ranked.iter().map(|f| f.score).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_forest_is_deterministic_per_seed() {
        let train = separable_split();
        let config = ForestConfig {
            n_trees: 5,
            max_features: Some(1),
            ..ForestConfig::default()
        };
        let a = config.fit(&train, 0.5, 11).unwrap();
        let b = config.fit(&train, 0.5, 11).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_probabilities_are_vote_shares() {
        let train = separable_split();
        let model = ForestConfig {
            n_trees: 4,
            ..ForestConfig::default()
        }
        .fit(&train, 0.5, 1)
        .unwrap();
        for p in model.predict_proba(train.features()) {
            let scaled = p * 4.0;
            assert!((scaled - scaled.round()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_max_features_exceeding_predictors() {
        let train = separable_split();
        let config = ForestConfig {
            max_features: Some(3),
            ..ForestConfig::default()
        };
        let err = config.fit(&train, 0.5, 0).unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigError(_)));
    }

    #[test]
    fn test_zero_trees_rejected() {
        let config = ForestConfig {
            n_trees: 0,
            ..ForestConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
