//! Ridge-regularized linear regression

use super::ridge::{fit_ridge, to_matrix, RidgeFit, Standardizer};
use super::{check_row, check_training_input, BaseLearner};
use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};

/// Linear regression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearConfig {
    /// L2 penalty on the standardized coefficients
    pub l2_reg: f64,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self { l2_reg: 1e-3 }
    }
}

impl LinearConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.l2_reg >= 0.0 && self.l2_reg.is_finite()) {
            return Err(EnsembleError::Configuration(format!(
                "linear l2_reg must be a non-negative number, got {}",
                self.l2_reg
            )));
        }
        Ok(())
    }
}

/// Linear regression on z-scored inputs, solved in closed form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    config: LinearConfig,
    scaler: Option<Standardizer>,
    fit: Option<RidgeFit>,
}

impl LinearRegression {
    pub fn new(config: LinearConfig) -> Self {
        Self {
            config,
            scaler: None,
            fit: None,
        }
    }

    /// Coefficients on the standardized features
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.fit.as_ref().and_then(|f| f.weights.as_slice())
    }
}

impl BaseLearner for LinearRegression {
    fn train(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<()> {
        check_training_input(self.name(), features, targets)?;

        let x = to_matrix(features);
        let scaler = Standardizer::fit(&x);
        let z = scaler.transform(&x);
        let y = ndarray::Array1::from_vec(targets.to_vec());

        // A tiny floor keeps the normal equations solvable for collinear inputs
        let lambda = self.config.l2_reg.max(1e-9) * features.len() as f64;
        let fit = fit_ridge(&z, &y, lambda)
            .ok_or_else(|| EnsembleError::learner(self.name(), "singular normal equations"))?;

        self.scaler = Some(scaler);
        self.fit = Some(fit);
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        let (scaler, fit) = match (&self.scaler, &self.fit) {
            (Some(s), Some(f)) => (s, f),
            _ => return Err(EnsembleError::NotTrained(self.name().to_string())),
        };
        check_row(scaler.dim(), features)?;
        Ok(fit.predict(&scaler.transform_row(features)))
    }

    fn name(&self) -> &str {
        "linear_regression"
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn feature_importance(&self) -> Vec<f64> {
        let Some(fit) = &self.fit else {
            return Vec::new();
        };
        let mut importance: Vec<f64> = fit.weights.iter().map(|w| w.abs()).collect();
        crate::data::sampling::normalize(&mut importance);
        importance
    }
}
