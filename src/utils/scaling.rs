use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::utils::AnalysisError;

/// Scaling method for feature normalization
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMethod {
    /// No scaling, raw predictor values
    None,
    /// MinMax scaling: (x - min) / (max - min) -> [0, 1]
    MinMax,
    /// Standard scaling: (x - mean) / std -> zero mean, unit variance
    #[default]
    Standard,
}

/// Per-column affine transform learned from a training matrix
///
/// Stored as `(x - offset) / scale`. Constant columns get `scale == 0.0`
/// and map to 0.0, so unseen values in a column that never varied during
/// training carry no weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub method: ScalingMethod,
    offsets: Vec<f64>,
    scales: Vec<f64>,
}

impl FeatureScaler {
    /// Learn column offsets and scales from `features`
    ///
    /// # Returns
    /// * `Ok(scaler)` - Fitted scaler with one entry per column
    /// * `Err(AnalysisError::FitError)` - If the matrix has no rows
    pub fn fit(method: ScalingMethod, features: ArrayView2<f64>) -> Result<Self, AnalysisError> {
        if features.nrows() == 0 {
            return Err(AnalysisError::fit("cannot fit a scaler on zero rows"));
        }

        let ncols = features.ncols();
        let mut offsets = vec![0.0; ncols];
        let mut scales = vec![1.0; ncols];

        for (col_idx, col) in features.columns().into_iter().enumerate() {
            match method {
                ScalingMethod::None => {}
                ScalingMethod::MinMax => {
                    let min = col.iter().cloned().fold(f64::INFINITY, f64::min);
                    let max = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    offsets[col_idx] = min;
                    scales[col_idx] = max - min;
                }
                ScalingMethod::Standard => {
                    offsets[col_idx] = col.mean().unwrap_or(0.0);
                    scales[col_idx] = col.std(0.0);
                }
            }
            if scales[col_idx].abs() < f64::EPSILON {
                scales[col_idx] = 0.0;
            }
        }

        Ok(Self {
            method,
            offsets,
            scales,
        })
    }

    /// Number of columns the scaler was fitted on
    pub fn n_features(&self) -> usize {
        self.offsets.len()
    }

    /// Apply the learned transform to a matrix with the same column layout
    pub fn transform(&self, features: ArrayView2<f64>) -> Array2<f64> {
        let mut scaled = features.to_owned();
        for (col_idx, mut col) in scaled.columns_mut().into_iter().enumerate() {
            let offset = self.offsets[col_idx];
            let scale = self.scales[col_idx];
            col.mapv_inplace(|x| if scale == 0.0 { 0.0 } else { (x - offset) / scale });
        }
        scaled
    }
}
