//! On-disk cache of fitted models.
//!
//! Entries are JSON files named `<variant>-<key prefix>.json`, where the key
//! hashes the variant, its hyperparameters, the cutoff, the seed and the
//! training split identity. Any change to those produces a different file.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::dataset::to_hex;
use crate::insight_core::{Classifier, ClassifierKind, FittedModel, ModelConfig};
use crate::split::Split;

/// Hex characters of the key used in file names
const KEY_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct ModelCache {
    dir: PathBuf,
}

impl ModelCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// SHA-256 over everything that determines the fitted model
    pub fn key(kind: ClassifierKind, config: &ModelConfig, train: &Split) -> String {
        let mut hasher = Sha256::new();
        hasher.update(config.fingerprint(kind).as_bytes());
        hasher.update([0u8]);
        hasher.update(train.identity().as_bytes());
        to_hex(&hasher.finalize())
    }

    pub fn path_for(&self, kind: ClassifierKind, config: &ModelConfig, train: &Split) -> PathBuf {
        let key = Self::key(kind, config, train);
        self.dir.join(format!("{}-{}.json", kind, &key[..KEY_PREFIX_LEN]))
    }

    /// Cached model for this variant, config and training split
    ///
    /// A missing, unreadable or mismatched entry yields `None`.
    pub fn load(&self, kind: ClassifierKind, config: &ModelConfig, train: &Split) -> Option<FittedModel> {
        let path = self.path_for(kind, config, train);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "model cache miss");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read cached model");
                return None;
            }
        };

        match serde_json::from_str::<FittedModel>(&text) {
            Ok(model) if model_matches(&model, kind, train) => {
                debug!(path = %path.display(), "model cache hit");
                Some(model)
            }
            Ok(_) => {
                warn!(path = %path.display(), "cached model does not match the training split; refitting");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cached model is corrupt; refitting");
                None
            }
        }
    }

    /// Write a fitted model; failures are logged and otherwise ignored
    pub fn store(&self, config: &ModelConfig, train: &Split, model: &FittedModel) {
        let path = self.path_for(model.kind(), config, train);
        let result = fs::create_dir_all(&self.dir)
            .map_err(|e| e.to_string())
            .and_then(|_| serde_json::to_string(model).map_err(|e| e.to_string()))
            .and_then(|json| fs::write(&path, json).map_err(|e| e.to_string()));

        match result {
            Ok(()) => debug!(path = %path.display(), "cached fitted model"),
            Err(error) => warn!(path = %path.display(), %error, "cannot cache fitted model"),
        }
    }
}

fn model_matches(model: &FittedModel, kind: ClassifierKind, train: &Split) -> bool {
    model.kind() == kind && model.feature_names() == train.feature_names()
}
