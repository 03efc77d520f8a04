//! Test doubles for the ensemble and controller tests

use super::BaseLearner;
use crate::error::{EnsembleError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Predicts a fixed value once trained; counts `train` calls
#[derive(Debug, Clone)]
pub struct ConstantLearner {
    value: f64,
    trained: bool,
    pub train_calls: Arc<AtomicUsize>,
}

impl ConstantLearner {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            trained: false,
            train_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl BaseLearner for ConstantLearner {
    fn train(&mut self, _features: &[Vec<f64>], _targets: &[f64]) -> Result<()> {
        self.train_calls.fetch_add(1, Ordering::SeqCst);
        self.trained = true;
        Ok(())
    }

    fn predict(&self, _features: &[f64]) -> Result<f64> {
        if !self.trained {
            return Err(EnsembleError::NotTrained("constant".into()));
        }
        Ok(self.value)
    }

    fn name(&self) -> &str {
        "constant"
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn feature_importance(&self) -> Vec<f64> {
        Vec::new()
    }
}

/// Fails on train and/or predict
#[derive(Debug, Clone)]
pub struct FailingLearner {
    fail_train: bool,
    trained: bool,
}

impl FailingLearner {
    /// Trains fine, always errors on predict
    pub fn on_predict() -> Self {
        Self {
            fail_train: false,
            trained: false,
        }
    }

    /// Errors on train
    pub fn on_train() -> Self {
        Self {
            fail_train: true,
            trained: false,
        }
    }
}

impl BaseLearner for FailingLearner {
    fn train(&mut self, _features: &[Vec<f64>], _targets: &[f64]) -> Result<()> {
        if self.fail_train {
            return Err(EnsembleError::learner("failing", "training exploded"));
        }
        self.trained = true;
        Ok(())
    }

    fn predict(&self, _features: &[f64]) -> Result<f64> {
        Err(EnsembleError::learner("failing", "prediction exploded"))
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn feature_importance(&self) -> Vec<f64> {
        Vec::new()
    }
}

/// Predicts `f(features)` once trained
#[derive(Debug, Clone)]
pub struct FnLearner {
    f: fn(&[f64]) -> f64,
    trained: bool,
    importance: Vec<f64>,
}

impl FnLearner {
    pub fn new(f: fn(&[f64]) -> f64) -> Self {
        Self {
            f,
            trained: false,
            importance: Vec::new(),
        }
    }

    pub fn with_importance(mut self, importance: Vec<f64>) -> Self {
        self.importance = importance;
        self
    }
}

impl BaseLearner for FnLearner {
    fn train(&mut self, _features: &[Vec<f64>], _targets: &[f64]) -> Result<()> {
        self.trained = true;
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        if !self.trained {
            return Err(EnsembleError::NotTrained("fn".into()));
        }
        Ok((self.f)(features))
    }

    fn name(&self) -> &str {
        "fn"
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn feature_importance(&self) -> Vec<f64> {
        self.importance.clone()
    }
}

/// Predicts the mean target of its last training batch
#[derive(Debug, Clone, Default)]
pub struct MeanLearner {
    mean: Option<f64>,
}

impl BaseLearner for MeanLearner {
    fn train(&mut self, _features: &[Vec<f64>], targets: &[f64]) -> Result<()> {
        if targets.is_empty() {
            return Err(EnsembleError::learner("mean", "empty batch"));
        }
        self.mean = Some(targets.iter().sum::<f64>() / targets.len() as f64);
        Ok(())
    }

    fn predict(&self, _features: &[f64]) -> Result<f64> {
        self.mean
            .ok_or_else(|| EnsembleError::NotTrained("mean".into()))
    }

    fn name(&self) -> &str {
        "mean"
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn feature_importance(&self) -> Vec<f64> {
        Vec::new()
    }
}

/// Trains once on the mean target; every later train errors
#[derive(Debug, Clone, Default)]
pub struct OneShotLearner {
    mean: Option<f64>,
}

impl BaseLearner for OneShotLearner {
    fn train(&mut self, _features: &[Vec<f64>], targets: &[f64]) -> Result<()> {
        if self.mean.is_some() {
            return Err(EnsembleError::learner("one_shot", "refit refused"));
        }
        self.mean = Some(targets.iter().sum::<f64>() / targets.len().max(1) as f64);
        Ok(())
    }

    fn predict(&self, _features: &[f64]) -> Result<f64> {
        self.mean
            .ok_or_else(|| EnsembleError::NotTrained("one_shot".into()))
    }

    fn name(&self) -> &str {
        "one_shot"
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn feature_importance(&self) -> Vec<f64> {
        Vec::new()
    }
}
