use serde::Serialize;

use crate::dataset::Dataset;

/// Descriptive statistics for one predictor column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub field: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl Statistics {
    /// Compute statistics for a predictor column in a dataset
    ///
    /// Returns `None` for an unknown column or an empty dataset.
    pub fn compute(dataset: &Dataset, field: &str) -> Option<Self> {
        let idx = dataset.feature_index(field)?;
        if dataset.is_empty() {
            return None;
        }

        let column = dataset.features().column(idx).to_owned();
        let count = column.len();
        let sum = column.sum();
        let mean = sum / count as f64;
        let std = column.std(0.0);
        let min = column.iter().copied().fold(f64::INFINITY, f64::min);
        let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Statistics {
            field: field.to_string(),
            count,
            mean,
            std,
            min,
            max,
            sum,
        })
    }
}

/// Statistics for every predictor, in schema order
pub fn describe(dataset: &Dataset) -> Vec<Statistics> {
    dataset
        .feature_names()
        .iter()
        .filter_map(|name| Statistics::compute(dataset, name))
        .collect()
}

/// Count of each label value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelBalance {
    pub negatives: usize,
    pub positives: usize,
}

impl LabelBalance {
    pub fn compute(labels: &[u8]) -> Self {
        let positives = labels.iter().filter(|&&l| l == 1).count();
        Self {
            negatives: labels.len() - positives,
            positives,
        }
    }

    /// Share of positive labels, 0.0 when there are no labels
    pub fn positive_rate(&self) -> f64 {
        let total = self.negatives + self.positives;
        if total == 0 {
            0.0
        } else {
            self.positives as f64 / total as f64
        }
    }
}
