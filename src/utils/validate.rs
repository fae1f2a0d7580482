use super::error::AnalysisError;

/// Validate a classification cutoff lies in the closed range [0, 1]
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(AnalysisError::ConfigError)` if out of range or NaN
pub fn validate_cutoff(cutoff: f64) -> Result<(), AnalysisError> {
    if !(0.0..=1.0).contains(&cutoff) {
        return Err(AnalysisError::ConfigError(format!(
            "cutoff must be 0-1, got {}",
            cutoff
        )));
    }
    Ok(())
}

/// Validate a split fraction lies in the open range (0, 1)
pub fn validate_fraction(fraction: f64) -> Result<(), AnalysisError> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(AnalysisError::ConfigError(format!(
            "train fraction must be strictly between 0 and 1, got {}",
            fraction
        )));
    }
    Ok(())
}

/// Validate a count parameter is at least one
pub fn validate_nonzero(name: &str, value: usize) -> Result<(), AnalysisError> {
    if value == 0 {
        return Err(AnalysisError::ConfigError(format!("{} must be > 0", name)));
    }
    Ok(())
}

/// Rescale non-negative scores so they sum to 1
///
/// An all-zero input stays all-zero.
pub fn normalize_to_unit_sum(scores: &[f64]) -> Vec<f64> {
    let total: f64 = scores.iter().sum();
    if total <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|&s| s / total).collect()
}
