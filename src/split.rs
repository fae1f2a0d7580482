use ndarray::{Array2, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::dataset::{to_hex, Dataset};
use crate::utils::{validate_fraction, AnalysisError};

/// Train/evaluation partition parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Share of records assigned to training, strictly between 0 and 1
    pub train_fraction: f64,
    pub seed: u64,
    /// Cut each label class separately so both subsets keep the class ratio
    pub stratify: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.7,
            seed: 42,
            stratify: false,
        }
    }
}

/// Rows of a [`Dataset`] selected by index
#[derive(Debug, Clone)]
pub struct Split {
    indices: Vec<usize>,
    feature_names: Vec<String>,
    features: Array2<f64>,
    labels: Vec<u8>,
    identity: String,
}

impl Split {
    /// Materialize the dataset rows at `indices`, keeping their order
    pub fn from_indices(dataset: &Dataset, indices: Vec<usize>) -> Self {
        let (features, labels) = dataset.select(&indices);

        let mut hasher = Sha256::new();
        hasher.update(dataset.fingerprint().as_bytes());
        for &idx in &indices {
            hasher.update((idx as u64).to_le_bytes());
        }

        Self {
            indices,
            feature_names: dataset.feature_names().to_vec(),
            features,
            labels,
            identity: to_hex(&hasher.finalize()),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Dataset row indices, in split order
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Stable hash of the source dataset and the selected rows
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// Partition a dataset into disjoint training and evaluation splits
///
/// The same dataset, fraction, seed and stratify flag always produce the
/// same partition.
///
/// # Returns
/// * `Ok((train, eval))` - Disjoint splits covering every row
/// * `Err(AnalysisError::ConfigError)` - If the fraction is outside (0, 1)
pub fn train_eval_split(dataset: &Dataset, config: &SplitConfig) -> Result<(Split, Split), AnalysisError> {
    validate_fraction(config.train_fraction)?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let (train_idx, eval_idx) = if config.stratify {
        let mut train_idx = Vec::new();
        let mut eval_idx = Vec::new();
        for class in [0u8, 1u8] {
            let members: Vec<usize> = (0..dataset.len())
                .filter(|&i| dataset.labels()[i] == class)
                .collect();
            let (train, eval) = cut(members, config.train_fraction, &mut rng);
            train_idx.extend(train);
            eval_idx.extend(eval);
        }
        train_idx.shuffle(&mut rng);
        eval_idx.shuffle(&mut rng);
        (train_idx, eval_idx)
    } else {
        cut((0..dataset.len()).collect(), config.train_fraction, &mut rng)
    };

    debug!(
        train = train_idx.len(),
        eval = eval_idx.len(),
        seed = config.seed,
        stratify = config.stratify,
        "split dataset"
    );

    Ok((
        Split::from_indices(dataset, train_idx),
        Split::from_indices(dataset, eval_idx),
    ))
}

fn cut(mut indices: Vec<usize>, fraction: f64, rng: &mut ChaCha8Rng) -> (Vec<usize>, Vec<usize>) {
    indices.shuffle(rng);
    let n_train = ((indices.len() as f64) * fraction).round() as usize;
    let eval = indices.split_off(n_train.min(indices.len()));
    (indices, eval)
}
