use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::LoadOptions;
use crate::evaluation::ImportanceMethod;
use crate::insight_core::ModelConfig;
use crate::split::SplitConfig;
use crate::utils::{validate_fraction, validate_nonzero, AnalysisError};

/// Every parameter of one pipeline run
///
/// Missing sections in a JSON file fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: LoadOptions,
    pub split: SplitConfig,
    pub model: ModelConfig,
    pub importance: ImportanceMethod,
    /// Directory for cached fitted models; `None` disables caching
    pub cache_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Read a config from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| AnalysisError::config(format!("cannot read config {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, AnalysisError> {
        serde_json::from_str(text).map_err(|e| AnalysisError::config(format!("invalid config: {}", e)))
    }

    /// Reject parameters that would fail later stages
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.data.label_column.is_empty() {
            return Err(AnalysisError::config("label column name is empty"));
        }
        validate_fraction(self.split.train_fraction)?;
        self.model.validate()?;
        if let ImportanceMethod::Permutation { repeats, .. } = self.importance {
            validate_nonzero("permutation repeats", repeats)?;
        }
        Ok(())
    }
}
