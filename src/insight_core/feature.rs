use ndarray::ArrayView2;

use crate::utils::AnalysisError;

/// Check that a predictor matrix is non-empty and entirely finite
///
/// # Returns
/// * `Err(AnalysisError::FitError)` naming the first offending cell
pub fn validate_features(features: ArrayView2<f64>) -> Result<(), AnalysisError> {
    let (rows, cols) = features.dim();
    if rows == 0 {
        return Err(AnalysisError::fit("training split is empty"));
    }
    if cols == 0 {
        return Err(AnalysisError::fit("training split has no predictor columns"));
    }

    if let Some(((row, col), value)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(AnalysisError::fit(format!(
            "non-finite value {} at row {}, column {}",
            value, row, col
        )));
    }

    Ok(())
}

/// Check a training split: finite predictors, one label per row and both classes present
pub fn validate_training(features: ArrayView2<f64>, labels: &[u8]) -> Result<(), AnalysisError> {
    validate_features(features)?;

    if features.nrows() != labels.len() {
        return Err(AnalysisError::fit(format!(
            "{} feature rows but {} labels",
            features.nrows(),
            labels.len()
        )));
    }

    let positives = labels.iter().filter(|&&l| l == 1).count();
    if positives == 0 || positives == labels.len() {
        return Err(AnalysisError::fit(format!(
            "training split contains a single class ({} records, {} positive)",
            labels.len(),
            positives
        )));
    }

    Ok(())
}
