use thiserror::Error;

/// Error type shared by every pipeline stage
///
/// All variants are terminal: the caller reports the error and aborts the run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    /// Input could not be loaded (missing file, missing label column, bad schema)
    #[error("LoadError: {0}")]
    LoadError(String),
    /// Invalid configuration (split fraction, cutoff, tree parameters)
    #[error("ConfigError: {0}")]
    ConfigError(String),
    /// Training data is empty, single-class or contains non-finite values
    #[error("FitError: {0}")]
    FitError(String),
}

impl AnalysisError {
    pub(crate) fn load(msg: impl Into<String>) -> Self {
        Self::LoadError(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub(crate) fn fit(msg: impl Into<String>) -> Self {
        Self::FitError(msg.into())
    }
}

impl From<csv::Error> for AnalysisError {
    fn from(err: csv::Error) -> Self {
        Self::LoadError(format!("failed to read CSV: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalysisError::LoadError("test error".to_string());
        assert_eq!(err.to_string(), "LoadError: test error");

        let err = AnalysisError::ConfigError("bad fraction".to_string());
        assert_eq!(err.to_string(), "ConfigError: bad fraction");

        let err = AnalysisError::FitError("single class".to_string());
        assert_eq!(err.to_string(), "FitError: single class");
    }

    #[test]
    fn test_csv_error_becomes_load_error() {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader("a,b\nc\n".as_bytes());
        let err = reader
            .records()
            .find_map(|r| r.err())
            .map(AnalysisError::from)
            .unwrap();
        assert!(matches!(err, AnalysisError::LoadError(_)));
        assert!(err.to_string().starts_with("LoadError: failed to read CSV"));
    }
}
