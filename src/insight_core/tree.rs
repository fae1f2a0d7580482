//! CART classification tree with per-split candidate feature sampling.

use ndarray::{ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Minimum impurity decrease for a split to be kept
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    /// Candidate predictors drawn (without replacement) at every split
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        /// Majority class; an even count votes positive
        class: u8,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn count_nodes(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.count_nodes() + right.count_nodes(),
        }
    }
}

/// Fitted classification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    root: TreeNode,
    n_nodes: usize,
}

struct Builder<'a> {
    features: ArrayView2<'a, f64>,
    labels: &'a [u8],
    params: TreeParams,
    rng: &'a mut ChaCha8Rng,
    importances: &'a mut [f64],
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl DecisionTree {
    /// Grow a tree on the rows listed in `sample` (repeats allowed)
    ///
    /// Each kept split adds its size-weighted Gini decrease to
    /// `importances[feature]`.
    pub fn fit(
        features: ArrayView2<f64>,
        labels: &[u8],
        sample: Vec<usize>,
        params: TreeParams,
        rng: &mut ChaCha8Rng,
        importances: &mut [f64],
    ) -> Self {
        let mut builder = Builder {
            features: features.reborrow(),
            labels,
            params,
            rng,
            importances,
        };
        let root = builder.grow(sample, 0);
        let n_nodes = root.count_nodes();
        Self { root, n_nodes }
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> u8 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { class, .. } => return *class,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

impl<'a> Builder<'a> {
    fn leaf(&self, sample: &[usize]) -> TreeNode {
        let positives = sample.iter().filter(|&&i| self.labels[i] == 1).count();
        TreeNode::Leaf {
            class: u8::from(2 * positives >= sample.len()),
            n_samples: sample.len(),
        }
    }

    fn grow(&mut self, sample: Vec<usize>, depth: usize) -> TreeNode {
        let n = sample.len();
        let positives = sample.iter().filter(|&&i| self.labels[i] == 1).count();

        let pure = positives == 0 || positives == n;
        let depth_reached = self.params.max_depth.map_or(false, |max| depth >= max);
        if pure || depth_reached || n < 2 * self.params.min_samples_leaf {
            return self.leaf(&sample);
        }

        let Some(best) = self.best_split(&sample, positives) else {
            return self.leaf(&sample);
        };

        self.importances[best.feature] += best.gain;

        let (left, right): (Vec<usize>, Vec<usize>) = sample
            .into_iter()
            .partition(|&i| self.features[[i, best.feature]] <= best.threshold);

        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    /// Lowest weighted Gini over the sampled candidate predictors
    fn best_split(&mut self, sample: &[usize], positives: usize) -> Option<BestSplit> {
        let n = sample.len();
        let parent = gini(positives, n) * n as f64;
        let min_leaf = self.params.min_samples_leaf;

        let mut candidates: Vec<usize> = (0..self.features.ncols()).collect();
        candidates.shuffle(&mut *self.rng);
        candidates.truncate(self.params.max_features);
        // scan in column order so equal-gain ties resolve the same way for any draw
        candidates.sort_unstable();

        let mut best: Option<BestSplit> = None;
        let mut pairs: Vec<(f64, u8)> = Vec::with_capacity(n);

        for feature in candidates {
            pairs.clear();
            pairs.extend(sample.iter().map(|&i| (self.features[[i, feature]], self.labels[i])));
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut left_pos = 0usize;
            for pos in 0..n - 1 {
                left_pos += usize::from(pairs[pos].1);
                let n_left = pos + 1;
                let n_right = n - n_left;
                if pairs[pos].0 == pairs[pos + 1].0 || n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let weighted = gini(left_pos, n_left) * n_left as f64
                    + gini(positives - left_pos, n_right) * n_right as f64;
                let gain = parent - weighted;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (pairs[pos].0 + pairs[pos + 1].0) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}
