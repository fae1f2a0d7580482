//! Logistic regression on scaled predictors, solved by `linfa-logistic`.
//!
//! Predictors are scaled with a [`FeatureScaler`] learned on the training
//! split, so the decision boundary is linear in the scaled space and the
//! coefficient magnitudes are comparable across predictors. The solver's
//! weights are copied out of the linfa model so the fitted classifier can be
//! cached and its cutoff rule stays under our control.

use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_logistic::LogisticRegression;
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::feature::validate_training;
use super::model::{Classifier, ClassifierAdapter, ClassifierKind};
use crate::split::Split;
use crate::utils::{AnalysisError, FeatureScaler, ScalingMethod};

/// Logistic regression hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    /// L2 penalty on the coefficients (not the intercept); 0 disables it
    pub l2_penalty: f64,
    /// L-BFGS iteration limit
    pub max_iterations: usize,
    /// Gradient norm at which the solver stops
    pub tolerance: f64,
    pub scaling: ScalingMethod,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            // a small penalty keeps weights finite when a predictor separates the classes
            l2_penalty: 0.01,
            max_iterations: 300,
            tolerance: 1e-4,
            scaling: ScalingMethod::Standard,
        }
    }
}

/// Fitted logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedLogistic {
    feature_names: Vec<String>,
    scaler: FeatureScaler,
    coefficients: Vec<f64>,
    intercept: f64,
    cutoff: f64,
}

impl FittedLogistic {
    /// Coefficients on the scaled predictors, in column order
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    fn decision_function(&self, records: ArrayView2<f64>) -> Array1<f64> {
        let scaled = self.scaler.transform(records);
        let weights = Array1::from(self.coefficients.clone());
        scaled.dot(&weights) + self.intercept
    }
}

/// Sigmoid activation: 1 / (1 + e^(-z)), evaluated without overflow
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Classifier for FittedLogistic {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Linear
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn predict_proba(&self, records: ArrayView2<f64>) -> Vec<f64> {
        self.decision_function(records).mapv(sigmoid).to_vec()
    }

    /// Absolute coefficient on the scaled predictor
    fn raw_importance(&self) -> Vec<f64> {
        self.coefficients.iter().map(|w| w.abs()).collect()
    }

    fn cost(&self) -> usize {
        self.coefficients.len() + 1
    }
}

impl ClassifierAdapter for LogisticConfig {
    type Fitted = FittedLogistic;

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Linear
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.l2_penalty.is_finite() && self.l2_penalty >= 0.0) {
            return Err(AnalysisError::config(format!(
                "l2_penalty must be >= 0, got {}",
                self.l2_penalty
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(AnalysisError::config(format!(
                "tolerance must be a positive number, got {}",
                self.tolerance
            )));
        }
        crate::utils::validate_nonzero("max_iterations", self.max_iterations)
    }

    /// L-BFGS starts from zero weights and is deterministic, so `seed` is unused
    fn fit(&self, train: &Split, cutoff: f64, _seed: u64) -> Result<FittedLogistic, AnalysisError> {
        self.validate()?;
        validate_training(train.features(), train.labels())?;

        let scaler = FeatureScaler::fit(self.scaling, train.features())?;
        let x = scaler.transform(train.features());
        let y: Array1<u8> = train.labels().iter().copied().collect();
        let dataset = DatasetBase::new(x, y);

        let fitted = LogisticRegression::default()
            .alpha(self.l2_penalty)
            .max_iterations(self.max_iterations as u64)
            .gradient_tolerance(self.tolerance)
            .fit(&dataset)
            .map_err(|e| AnalysisError::fit(format!("logistic regression failed: {}", e)))?;

        // linfa picks which label it treats as positive; orient weights toward class 1
        let sign = if fitted.labels().pos.class == 1 { 1.0 } else { -1.0 };
        let coefficients: Vec<f64> = fitted.params().iter().map(|w| sign * w).collect();
        let intercept = sign * fitted.intercept();

        debug!(
            n_records = train.len(),
            intercept,
            "logistic regression fitted"
        );

        Ok(FittedLogistic {
            feature_names: train.feature_names().to_vec(),
            scaler,
            coefficients,
            intercept,
            cutoff,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use ndarray::{arr2, Array2};

    fn split_of(names: &[&str], features: Array2<f64>, labels: Vec<u8>) -> Split {
        let n = labels.len();
        let dataset = Dataset::new(
            "logistic",
            names.iter().map(|s| s.to_string()).collect(),
            features,
            labels,
        )
        .unwrap();
        Split::from_indices(&dataset, (0..n).collect())
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(!sigmoid(-800.0).is_nan());
    }

    #[test]
    fn test_fit_separable_one_feature() {
        let features = arr2(&[[1.0], [2.0], [3.0], [4.0], [6.0], [7.0], [8.0], [9.0]]);
        let train = split_of(&["rent"], features.clone(), vec![1, 1, 1, 1, 0, 0, 0, 0]);

        let model = LogisticConfig::default().fit(&train, 0.5, 0).unwrap();
        assert_eq!(model.predict(features.view()), vec![1, 1, 1, 1, 0, 0, 0, 0]);
        assert!(model.coefficients()[0] < 0.0);

        let probs = model.predict_proba(features.view());
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_cutoff_extremes() {
        let features = arr2(&[[-1.0], [-2.0], [1.0], [2.0]]);
        let train = split_of(&["x"], features.clone(), vec![0, 0, 1, 1]);

        let always = LogisticConfig::default().fit(&train, 0.0, 0).unwrap();
        assert_eq!(always.predict(features.view()), vec![1, 1, 1, 1]);

        let strict = LogisticConfig::default().fit(&train, 0.99, 0).unwrap();
        let probs = strict.predict_proba(features.view());
        let expected: Vec<u8> = probs.iter().map(|&p| u8::from(p >= 0.99)).collect();
        assert_eq!(strict.predict(features.view()), expected);
        assert_eq!(strict.predict(features.view())[0], 0);
    }

    #[test]
    fn test_l2_penalty_shrinks_coefficients() {
        let features = arr2(&[[1.0], [2.0], [3.0], [4.0], [6.0], [7.0], [8.0], [9.0]]);
        let labels = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let train = split_of(&["x"], features, labels);

        let free = LogisticConfig::default().fit(&train, 0.5, 0).unwrap();
        let penalized = LogisticConfig {
            l2_penalty: 1.0,
            ..LogisticConfig::default()
        }
        .fit(&train, 0.5, 0)
        .unwrap();

        assert!(penalized.coefficients()[0].abs() < free.coefficients()[0].abs());
    }

    #[test]
    fn test_separable_fit_stays_bounded() {
        // a perfectly separating predictor would drive an unpenalized weight to infinity
        let features = arr2(&[[1.0], [2.0], [3.0], [4.0], [6.0], [7.0], [8.0], [9.0]]);
        let train = split_of(&["x"], features.clone(), vec![0, 0, 0, 0, 1, 1, 1, 1]);

        let model = LogisticConfig::default().fit(&train, 0.5, 0).unwrap();
        let weight = model.coefficients()[0];
        assert!(weight.is_finite() && weight > 0.0 && weight < 50.0);
        assert!(model.intercept().is_finite());
        assert_eq!(model.predict(features.view()), vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_fit_single_class_fails() {
        let train = split_of(&["x"], arr2(&[[1.0], [2.0]]), vec![1, 1]);
        let err = LogisticConfig::default().fit(&train, 0.5, 0).unwrap_err();
        assert!(matches!(err, AnalysisError::FitError(_)));
    }

    #[test]
    fn test_invalid_solver_settings() {
        for config in [
            LogisticConfig {
                tolerance: 0.0,
                ..LogisticConfig::default()
            },
            LogisticConfig {
                l2_penalty: -1.0,
                ..LogisticConfig::default()
            },
            LogisticConfig {
                max_iterations: 0,
                ..LogisticConfig::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(AnalysisError::ConfigError(_))));
        }
    }

    #[test]
    fn test_importance_is_coefficient_magnitude() {
        let features = arr2(&[
            [1.0, 5.0],
            [2.0, 4.0],
            [3.0, 5.0],
            [7.0, 4.0],
            [8.0, 5.0],
            [9.0, 4.0],
        ]);
        let train = split_of(&["signal", "noise"], features, vec![0, 0, 0, 1, 1, 1]);
        let model = LogisticConfig::default().fit(&train, 0.5, 0).unwrap();

        let ranked = model.feature_importance();
        assert_eq!(ranked[0].feature, "signal");
        assert!(ranked[0].score > ranked[1].score);
        assert_eq!(model.cost(), 3);
    }
}
