//! Base learners
//!
//! Every predictor the ensemble owns implements [`BaseLearner`]. Concrete
//! implementations:
//!
//! - `DecisionTreeRegressor` - CART regression tree
//! - `LinearRegression` - standardized ridge regression
//! - `NeuralNetwork` - one hidden layer MLP trained with SGD
//! - `LstmRegressor` - frozen LSTM encoder with a ridge readout
//! - `TransformerRegressor` - single-head self-attention encoder with a ridge readout

mod decision_tree;
mod factory;
mod linear;
mod lstm;
mod neural_net;
mod ridge;
mod transformer;

#[cfg(test)]
pub(crate) mod mock;

pub use decision_tree::{DecisionTreeRegressor, TreeConfig};
pub use factory::{LearnerFactory, LearnerKind, LearnerParams};
pub use linear::{LinearConfig, LinearRegression};
pub use lstm::{LstmConfig, LstmRegressor};
pub use neural_net::{NeuralNetConfig, NeuralNetwork};
pub use transformer::{TransformerConfig, TransformerRegressor};

use crate::error::{EnsembleError, Result};
use std::fmt;

/// Capability contract for any trainable scalar predictor
///
/// Implementations own all of their fitted state; `clone_box` must return a
/// deep, independent copy (fitted parameters included) so a clone predicts
/// exactly what the original predicts.
pub trait BaseLearner: Send + Sync + fmt::Debug {
    /// Fit on a feature matrix and per-row targets
    fn train(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<()>;

    /// Predict a single row; `NotTrained` before a successful `train`
    fn predict(&self, features: &[f64]) -> Result<f64>;

    /// Stable learner-type name
    fn name(&self) -> &str;

    /// Independent deep copy
    fn clone_box(&self) -> Box<dyn BaseLearner>;

    /// Per-feature importance, empty when unsupported
    fn feature_importance(&self) -> Vec<f64>;
}

impl Clone for Box<dyn BaseLearner> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Validate a training batch and return its feature dimension
pub(crate) fn check_training_input(
    learner: &str,
    features: &[Vec<f64>],
    targets: &[f64],
) -> Result<usize> {
    if features.is_empty() {
        return Err(EnsembleError::learner(learner, "empty training set"));
    }
    if features.len() != targets.len() {
        return Err(EnsembleError::DimensionMismatch {
            expected: features.len(),
            actual: targets.len(),
        });
    }

    let n_features = features[0].len();
    if n_features == 0 {
        return Err(EnsembleError::learner(learner, "rows have no features"));
    }
    for row in features {
        if row.len() != n_features {
            return Err(EnsembleError::DimensionMismatch {
                expected: n_features,
                actual: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(EnsembleError::learner(learner, "non-finite feature value"));
        }
    }
    if targets.iter().any(|t| !t.is_finite()) {
        return Err(EnsembleError::learner(learner, "non-finite target value"));
    }

    Ok(n_features)
}

/// Validate a prediction row against the fitted dimension
pub(crate) fn check_row(expected: usize, features: &[f64]) -> Result<()> {
    if features.len() != expected {
        return Err(EnsembleError::DimensionMismatch {
            expected,
            actual: features.len(),
        });
    }
    Ok(())
}
