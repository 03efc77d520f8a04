//! Decision tree regressor

use super::{check_row, check_training_input, BaseLearner};
use crate::error::{EnsembleError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Decision tree configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Maximum depth of tree
    pub max_depth: usize,
    /// Minimum samples required to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf node
    pub min_samples_leaf: usize,
    /// Maximum features to consider for split (None = all)
    pub max_features: Option<usize>,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_split: 4,
            min_samples_leaf: 2,
            max_features: None,
            seed: 42,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(EnsembleError::Configuration(
                "tree max_depth must be at least 1".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 || self.min_samples_split < 2 {
            return Err(EnsembleError::Configuration(
                "tree needs min_samples_leaf >= 1 and min_samples_split >= 2".to_string(),
            ));
        }
        if self.max_features == Some(0) {
            return Err(EnsembleError::Configuration(
                "tree max_features must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// CART regression tree with variance-reduction splits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    config: TreeConfig,
    root: Option<TreeNode>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl DecisionTreeRegressor {
    /// Create a new decision tree with config
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            root: None,
            n_features: 0,
            feature_importances: Vec::new(),
        }
    }

    /// Depth of the fitted tree (0 when untrained)
    pub fn depth(&self) -> usize {
        self.root.as_ref().map(|r| r.depth()).unwrap_or(0)
    }

    fn build_tree(
        &mut self,
        features: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let value = mean(indices.iter().map(|&i| targets[i]));
        let impurity = variance(indices, targets);

        if depth >= self.config.max_depth
            || indices.len() < self.config.min_samples_split
            || impurity < 1e-12
        {
            return TreeNode::Leaf { value };
        }

        match self.find_best_split(features, targets, indices, rng) {
            Some(split) => {
                self.feature_importances[split.feature_idx] += split.gain * indices.len() as f64;

                let left = self.build_tree(features, targets, &split.left, depth + 1, rng);
                let right = self.build_tree(features, targets, &split.right, depth + 1, rng);

                TreeNode::Split {
                    feature_idx: split.feature_idx,
                    threshold: split.threshold,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            None => TreeNode::Leaf { value },
        }
    }

    /// Sweep each candidate feature in sorted order keeping running sums
    fn find_best_split(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let max_features = self
            .config
            .max_features
            .unwrap_or(self.n_features)
            .min(self.n_features);

        let mut feature_indices: Vec<usize> = (0..self.n_features).collect();
        feature_indices.shuffle(rng);
        feature_indices.truncate(max_features);

        let n = indices.len();
        let total_sum: f64 = indices.iter().map(|&i| targets[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| targets[i] * targets[i]).sum();
        let parent_impurity = total_sq / n as f64 - (total_sum / n as f64).powi(2);
        let min_leaf = self.config.min_samples_leaf;

        let mut best: Option<(usize, f64, f64)> = None;

        for &feature_idx in &feature_indices {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| {
                features[a][feature_idx]
                    .partial_cmp(&features[b][feature_idx])
                    .unwrap_or(Ordering::Equal)
            });

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for pos in 0..n - 1 {
                let y = targets[order[pos]];
                left_sum += y;
                left_sq += y * y;

                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let current = features[order[pos]][feature_idx];
                let next = features[order[pos + 1]][feature_idx];
                if next <= current {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_imp = left_sq / n_left as f64 - (left_sum / n_left as f64).powi(2);
                let right_imp = right_sq / n_right as f64 - (right_sum / n_right as f64).powi(2);
                let weighted = (n_left as f64 * left_imp + n_right as f64 * right_imp) / n as f64;
                let gain = parent_impurity - weighted;

                if gain > best.map(|(_, _, g)| g).unwrap_or(1e-12) {
                    best = Some((feature_idx, (current + next) / 2.0, gain));
                }
            }
        }

        best.map(|(feature_idx, threshold, gain)| {
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| features[i][feature_idx] <= threshold);
            SplitCandidate {
                feature_idx,
                threshold,
                gain,
                left,
                right,
            }
        })
    }

    fn traverse(node: &TreeNode, features: &[f64]) -> f64 {
        match node {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
            } => {
                // NaN compares false and falls to the right branch
                if features[*feature_idx] <= *threshold {
                    Self::traverse(left, features)
                } else {
                    Self::traverse(right, features)
                }
            }
        }
    }
}

impl BaseLearner for DecisionTreeRegressor {
    fn train(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<()> {
        self.n_features = check_training_input(self.name(), features, targets)?;
        self.feature_importances = vec![0.0; self.n_features];

        let indices: Vec<usize> = (0..features.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        let root = self.build_tree(features, targets, &indices, 0, &mut rng);
        self.root = Some(root);

        // Normalize feature importances
        let sum: f64 = self.feature_importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= sum;
            }
        }
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| EnsembleError::NotTrained(self.name().to_string()))?;
        check_row(self.n_features, features)?;
        Ok(Self::traverse(root, features))
    }

    fn name(&self) -> &str {
        "decision_tree"
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn feature_importance(&self) -> Vec<f64> {
        self.feature_importances.clone()
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn variance(indices: &[usize], targets: &[f64]) -> f64 {
    let m = mean(indices.iter().map(|&i| targets[i]));
    mean(indices.iter().map(|&i| (targets[i] - m).powi(2)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64 / 10.0, (i % 7) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| if r[0] > 5.0 { 2.0 } else { -1.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_tree_fits_step_function() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new(TreeConfig::default());
        tree.train(&x, &y).unwrap();

        assert_eq!(tree.predict(&[1.0, 3.0]).unwrap(), -1.0);
        assert_eq!(tree.predict(&[8.0, 3.0]).unwrap(), 2.0);
        assert!(tree.depth() >= 2);

        let importance = tree.feature_importance();
        assert_eq!(importance.len(), 2);
        assert!(importance[0] > importance[1]);
    }

    #[test]
    fn test_tree_not_trained_and_dimension() {
        let tree = DecisionTreeRegressor::new(TreeConfig::default());
        assert!(matches!(tree.predict(&[1.0]), Err(EnsembleError::NotTrained(_))));

        let (x, y) = step_data();
        let mut tree = tree;
        tree.train(&x, &y).unwrap();
        assert!(matches!(
            tree.predict(&[1.0]),
            Err(EnsembleError::DimensionMismatch { .. })
        ));
        // NaN input does not panic
        assert!(tree.predict(&[f64::NAN, 1.0]).is_ok());
    }

    #[test]
    fn test_tree_clone_predicts_identically() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new(TreeConfig::default());
        tree.train(&x, &y).unwrap();

        let copy = tree.clone_box();
        for row in &x {
            assert_eq!(tree.predict(row).unwrap(), copy.predict(row).unwrap());
        }
    }

    #[test]
    fn test_tree_config_validation() {
        assert!(TreeConfig::default().validate().is_ok());
        let bad = TreeConfig {
            max_depth: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
