//! Samples and training datasets

use crate::error::{EnsembleError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observation: feature vector, scalar target and optional timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub features: Vec<f64>,
    pub target: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Sample {
    /// Create a sample without a timestamp
    pub fn new(features: Vec<f64>, target: f64) -> Self {
        Self {
            features,
            target,
            timestamp: None,
        }
    }

    /// Create a sample stamped with the current time
    pub fn now(features: Vec<f64>, target: f64) -> Self {
        Self {
            features,
            target,
            timestamp: Some(Utc::now()),
        }
    }

    /// Number of features
    pub fn n_features(&self) -> usize {
        self.features.len()
    }
}

/// Dataset for training and evaluation
///
/// Row count of `features` equals the number of `targets`; every row has
/// exactly `feature_names.len()` columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingDataset {
    /// Feature matrix (n_samples x n_features)
    features: Vec<Vec<f64>>,
    /// Per-row targets
    targets: Vec<f64>,
    /// Ordered feature labels
    feature_names: Vec<String>,
}

impl TrainingDataset {
    /// Create a dataset, checking the shape invariants
    pub fn new(
        features: Vec<Vec<f64>>,
        targets: Vec<f64>,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        if features.is_empty() {
            return Err(EnsembleError::EmptyData("dataset has no rows".to_string()));
        }
        if features.len() != targets.len() {
            return Err(EnsembleError::DimensionMismatch {
                expected: features.len(),
                actual: targets.len(),
            });
        }
        let n_features = feature_names.len();
        if n_features == 0 {
            return Err(EnsembleError::EmptyData("dataset has no features".to_string()));
        }
        if let Some(row) = features.iter().find(|row| row.len() != n_features) {
            return Err(EnsembleError::DimensionMismatch {
                expected: n_features,
                actual: row.len(),
            });
        }

        Ok(Self {
            features,
            targets,
            feature_names,
        })
    }

    /// Create a dataset with generated names `f0..fN`
    pub fn unnamed(features: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<Self> {
        let n_features = features.first().map(|row| row.len()).unwrap_or(0);
        let names = (0..n_features).map(|i| format!("f{}", i)).collect();
        Self::new(features, targets, names)
    }

    /// Build a dataset from buffered samples
    pub fn from_samples(samples: &[Sample], feature_names: Vec<String>) -> Result<Self> {
        let features = samples.iter().map(|s| s.features.clone()).collect();
        let targets = samples.iter().map(|s| s.target).collect();
        Self::new(features, targets, feature_names)
    }

    /// Number of samples
    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    /// Number of features
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Mean of the targets
    pub fn mean_target(&self) -> f64 {
        self.targets.iter().sum::<f64>() / self.targets.len() as f64
    }

    /// Create a subset of the dataset by row indices (repeats allowed)
    pub fn subset(&self, indices: &[usize]) -> TrainingDataset {
        TrainingDataset {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
            feature_names: self.feature_names.clone(),
        }
    }

    /// Most recent `n` rows, preserving order
    pub fn tail(&self, n: usize) -> TrainingDataset {
        let start = self.n_samples().saturating_sub(n);
        let indices: Vec<usize> = (start..self.n_samples()).collect();
        self.subset(&indices)
    }

    /// Append the rows of another dataset with the same feature layout
    pub fn extend(&mut self, other: &TrainingDataset) -> Result<()> {
        if other.n_features() != self.n_features() {
            return Err(EnsembleError::DimensionMismatch {
                expected: self.n_features(),
                actual: other.n_features(),
            });
        }
        self.features.extend(other.features.iter().cloned());
        self.targets.extend(other.targets.iter().copied());
        Ok(())
    }
}
