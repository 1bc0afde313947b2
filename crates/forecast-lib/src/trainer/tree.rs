//! CART regression tree with an MSE split criterion

use crate::error::ModelError;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: TreeNode,
    n_features: usize,
    feature_importances: Vec<f64>,
}

struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Sum of squared deviations from the mean, from running sums
fn sse(count: usize, sum: f64, sq_sum: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    (sq_sum - sum * sum / count as f64).max(0.0)
}

impl RegressionTree {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: TreeParams) -> Result<Self, ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if x.nrows() != y.len() {
            return Err(ModelError::ShapeMismatch {
                expected: x.nrows(),
                actual: y.len(),
            });
        }

        let n_features = x.ncols();
        let mut importances = vec![0.0; n_features];
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let root = build(x, y, &indices, 0, &params, &mut importances);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        Ok(Self {
            root,
            n_features,
            feature_importances: importances,
        })
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature_idx] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Normalised impurity decrease per feature, summing to 1 unless the
    /// tree never split
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn depth(&self) -> usize {
        fn depth_of(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        depth_of(&self.root)
    }
}

fn build(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &[usize],
    depth: usize,
    params: &TreeParams,
    importances: &mut [f64],
) -> TreeNode {
    let n_samples = indices.len();
    let sum: f64 = indices.iter().map(|&i| y[i]).sum();
    let sq_sum: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
    let value = sum / n_samples as f64;
    let parent_sse = sse(n_samples, sum, sq_sum);

    let should_stop = n_samples < params.min_samples_split
        || n_samples < 2 * params.min_samples_leaf
        || params.max_depth.map_or(false, |d| depth >= d)
        || parent_sse <= 0.0;
    if should_stop {
        return TreeNode::Leaf { value, n_samples };
    }

    let Some(best) = find_best_split(x, y, indices, parent_sse, params) else {
        return TreeNode::Leaf { value, n_samples };
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);

    importances[best.feature_idx] += best.gain;

    TreeNode::Split {
        feature_idx: best.feature_idx,
        threshold: best.threshold,
        left: Box::new(build(x, y, &left_idx, depth + 1, params, importances)),
        right: Box::new(build(x, y, &right_idx, depth + 1, params, importances)),
        n_samples,
    }
}

/// Scan every feature in sorted order and keep the first split with the
/// largest SSE reduction
fn find_best_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &[usize],
    parent_sse: f64,
    params: &TreeParams,
) -> Option<SplitCandidate> {
    let n = indices.len();
    let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();

    let mut best: Option<SplitCandidate> = None;
    let mut order = indices.to_vec();

    for feature_idx in 0..x.ncols() {
        order.sort_by(|&a, &b| {
            x[[a, feature_idx]]
                .partial_cmp(&x[[b, feature_idx]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for pos in 0..n - 1 {
            let yi = y[order[pos]];
            left_sum += yi;
            left_sq += yi * yi;

            let here = x[[order[pos], feature_idx]];
            let next = x[[order[pos + 1], feature_idx]];
            if here >= next {
                continue;
            }

            let left_count = pos + 1;
            let right_count = n - left_count;
            if left_count < params.min_samples_leaf || right_count < params.min_samples_leaf {
                continue;
            }

            let children = sse(left_count, left_sum, left_sq)
                + sse(right_count, total_sum - left_sum, total_sq - left_sq);
            let gain = parent_sse - children;
            if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                best = Some(SplitCandidate {
                    feature_idx,
                    threshold: (here + next) / 2.0,
                    gain,
                });
            }
        }
    }

    best
}
