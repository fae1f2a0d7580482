//! Scoring a fitted classifier against a held-out split.

use ndarray::{Array2, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::insight_core::{rank_importances, Classifier, ClassifierKind, FeatureImportance};
use crate::split::Split;
use crate::utils::{validate_nonzero, AnalysisError};

/// How predictor importances are reported in an [`EvaluationResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ImportanceMethod {
    /// The model's own measure: coefficient magnitude for the linear variant,
    /// mean impurity decrease for the ensemble
    #[default]
    Intrinsic,
    /// Mean accuracy drop on the evaluation split when one column is shuffled
    Permutation { repeats: usize, seed: u64 },
}

/// Binary confusion counts, named by (true label, predicted label)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// true 0, predicted 0
    pub true_negative: usize,
    /// true 0, predicted 1
    pub false_positive: usize,
    /// true 1, predicted 0
    pub false_negative: usize,
    /// true 1, predicted 1
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(truth: &[u8], predicted: &[u8]) -> Self {
        let mut matrix = Self::default();
        for (&t, &p) in truth.iter().zip(predicted) {
            match (t, p) {
                (0, 0) => matrix.true_negative += 1,
                (0, _) => matrix.false_positive += 1,
                (_, 0) => matrix.false_negative += 1,
                _ => matrix.true_positive += 1,
            }
        }
        matrix
    }

    /// Counts indexed as `[true label][predicted label]`
    pub fn counts(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negative, self.false_positive],
            [self.false_negative, self.true_positive],
        ]
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_negative + self.true_positive, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Fraction of positions where the prediction equals the truth
pub fn accuracy(truth: &[u8], predicted: &[u8]) -> f64 {
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    ratio(correct, truth.len())
}

/// Scores for one fitted model on one evaluation split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub variant: ClassifierKind,
    pub split_identity: String,
    pub n_records: usize,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub importance_method: ImportanceMethod,
    pub importances: Vec<FeatureImportance>,
    /// Size of the fitted model (parameters or tree nodes)
    pub cost: usize,
}

/// Evaluate a fitted model on a held-out split
///
/// # Returns
/// * `Ok(result)` - Accuracy, confusion matrix and ranked importances
/// * `Err(AnalysisError::ConfigError)` - If the split is empty, its schema differs
///   from the model's, or the permutation settings are invalid
pub fn evaluate<M: Classifier + ?Sized>(
    model: &M,
    eval: &Split,
    method: ImportanceMethod,
) -> Result<EvaluationResult, AnalysisError> {
    let _span = info_span!("evaluate", variant = %model.kind(), records = eval.len()).entered();

    if eval.is_empty() {
        return Err(AnalysisError::config(
            "evaluation split is empty; lower train_fraction or supply more records",
        ));
    }
    if model.feature_names() != eval.feature_names() {
        return Err(AnalysisError::config(
            "evaluation split columns differ from the columns the model was fitted on",
        ));
    }

    let predicted = model.predict(eval.features());
    let confusion = ConfusionMatrix::from_labels(eval.labels(), &predicted);

    let importances = match method {
        ImportanceMethod::Intrinsic => model.feature_importance(),
        ImportanceMethod::Permutation { repeats, seed } => {
            validate_nonzero("permutation repeats", repeats)?;
            let scores = permutation_importance(model, eval.features(), eval.labels(), repeats, seed);
            rank_importances(model.feature_names(), &scores)
        }
    };

    debug!(accuracy = confusion.accuracy(), "evaluated model");

    Ok(EvaluationResult {
        variant: model.kind(),
        split_identity: eval.identity().to_string(),
        n_records: eval.len(),
        accuracy: confusion.accuracy(),
        confusion,
        precision: confusion.precision(),
        recall: confusion.recall(),
        f1: confusion.f1(),
        importance_method: method,
        importances,
        cost: model.cost(),
    })
}

/// Mean accuracy drop per predictor when that column's values are shuffled
pub fn permutation_importance<M: Classifier + ?Sized>(
    model: &M,
    features: ArrayView2<f64>,
    labels: &[u8],
    repeats: usize,
    seed: u64,
) -> Vec<f64> {
    let baseline = accuracy(labels, &model.predict(features));
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut shuffled: Array2<f64> = features.to_owned();
    let mut order: Vec<usize> = (0..features.nrows()).collect();

    (0..features.ncols())
        .map(|col| {
            let mut total_drop = 0.0;
            for _ in 0..repeats {
                order.shuffle(&mut rng);
                for (row, &src) in order.iter().enumerate() {
                    shuffled[[row, col]] = features[[src, col]];
                }
                total_drop += baseline - accuracy(labels, &model.predict(shuffled.view()));
            }
            shuffled.column_mut(col).assign(&features.column(col));
            total_drop / repeats as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    /// Predicts positive when the first column is at least 0.5
    struct FirstColumn {
        names: Vec<String>,
    }

    impl Classifier for FirstColumn {
        fn kind(&self) -> ClassifierKind {
            ClassifierKind::Linear
        }

        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn cutoff(&self) -> f64 {
            0.5
        }

        fn predict_proba(&self, records: ArrayView2<f64>) -> Vec<f64> {
            records.column(0).to_vec()
        }

        fn raw_importance(&self) -> Vec<f64> {
            vec![1.0, 0.0]
        }

        fn cost(&self) -> usize {
            1
        }
    }

    fn eval_split(values: &[[f64; 2]], labels: Vec<u8>) -> (FirstColumn, Split) {
        let names = vec!["x".to_string(), "z".to_string()];
        let features = ndarray::arr2(values);
        let n = labels.len();
        let dataset = Dataset::new("eval", names.clone(), features, labels).unwrap();
        (FirstColumn { names }, Split::from_indices(&dataset, (0..n).collect()))
    }

    #[test]
    fn test_confusion_matrix_counts() {
        let matrix = ConfusionMatrix::from_labels(&[0, 0, 1, 1, 1], &[0, 1, 0, 1, 1]);
        assert_eq!(matrix.counts(), [[1, 1], [1, 2]]);
        assert_eq!(matrix.total(), 5);
        assert!((matrix.accuracy() - 0.6).abs() < 1e-12);
        assert!((matrix.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((matrix.recall() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_probability_at_cutoff_predicts_positive() {
        let (model, split) = eval_split(&[[0.5, 0.0], [0.49, 0.0], [0.51, 0.0]], vec![1, 0, 1]);
        assert_eq!(model.predict(split.features()), vec![1, 0, 1]);

        let result = evaluate(&model, &split, ImportanceMethod::Intrinsic).unwrap();
        assert_eq!(result.accuracy, 1.0);
        assert_eq!(result.confusion.total(), 3);
    }

    #[test]
    fn test_evaluate_reports_intrinsic_importance() {
        let (model, split) = eval_split(&[[0.9, 1.0], [0.1, 2.0]], vec![1, 1]);
        let result = evaluate(&model, &split, ImportanceMethod::Intrinsic).unwrap();

        assert_eq!(result.accuracy, 0.5);
        assert_eq!(result.confusion.false_negative, 1);
        assert_eq!(result.importances[0].feature, "x");
        assert_eq!(result.split_identity, split.identity());
        assert_eq!(result.n_records, 2);
    }

    #[test]
    fn test_permutation_importance_ignores_unused_column() {
        let values: Vec<[f64; 2]> = (0..40)
            .map(|i| [if i % 2 == 0 { 0.9 } else { 0.1 }, i as f64])
            .collect();
        let labels = (0..40).map(|i| u8::from(i % 2 == 0)).collect();
        let (model, split) = eval_split(&values, labels);

        let scores = permutation_importance(&model, split.features(), split.labels(), 5, 9);
        assert!(scores[0] > 0.2);
        assert_eq!(scores[1], 0.0);

        let result = evaluate(&model, &split, ImportanceMethod::Permutation { repeats: 5, seed: 9 }).unwrap();
        assert_eq!(result.importances[0].feature, "x");
    }

    #[test]
    fn test_empty_split_is_rejected() {
        let (model, split) = eval_split(&[[0.9, 1.0]], vec![1]);
        let dataset = Dataset::new(
            "empty",
            split.feature_names().to_vec(),
            Array2::zeros((0, 2)),
            Vec::new(),
        )
        .unwrap();
        let empty = Split::from_indices(&dataset, Vec::new());
        let err = evaluate(&model, &empty, ImportanceMethod::Intrinsic).unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigError(_)));
    }

    #[test]
    fn test_zero_permutation_repeats_rejected() {
        let (model, split) = eval_split(&[[0.9, 1.0]], vec![1]);
        let method = ImportanceMethod::Permutation { repeats: 0, seed: 1 };
        assert!(evaluate(&model, &split, method).is_err());
    }
}
