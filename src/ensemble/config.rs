//! Ensemble configuration

use super::Strategy;
use crate::error::{EnsembleError, Result};
use crate::learners::LearnerKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Boosting tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    /// A sample counts as correct when `|pred - target|` is below this
    /// fraction of the targets' median absolute deviation
    pub correct_tolerance_ratio: f64,
    /// Lower clamp on the weighted error before taking the log-odds
    pub error_clamp: f64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            correct_tolerance_ratio: 0.1,
            error_clamp: 1e-10,
        }
    }
}

/// Static priors and health factors for the weighted-ensemble mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightingConfig {
    /// Base prior per learner name
    pub priors: BTreeMap<String, f64>,
    /// Prior for names missing from `priors`
    pub default_prior: f64,
    /// Multiplier for trained learners with no recent predict failures
    pub healthy_factor: f64,
    /// Multiplier for learners that never trained
    pub untrained_factor: f64,
    /// Predictions with a larger magnitude are discarded
    pub plausible_limit: f64,
}

impl Default for WeightingConfig {
    fn default() -> Self {
        let priors = [
            (LearnerKind::DecisionTree, 0.25),
            (LearnerKind::LinearRegression, 0.25),
            (LearnerKind::Lstm, 0.2),
            (LearnerKind::NeuralNetwork, 0.15),
            (LearnerKind::Transformer, 0.15),
        ]
        .into_iter()
        .map(|(kind, p)| (kind.as_str().to_string(), p))
        .collect();

        Self {
            priors,
            default_prior: 0.1,
            healthy_factor: 1.1,
            untrained_factor: 0.01,
            plausible_limit: 20.0,
        }
    }
}

impl WeightingConfig {
    pub fn prior_for(&self, name: &str) -> f64 {
        self.priors.get(name).copied().unwrap_or(self.default_prior)
    }

    pub fn validate(&self) -> Result<()> {
        let all_priors = self.priors.values().chain(std::iter::once(&self.default_prior));
        for p in all_priors {
            if !(*p >= 0.0 && p.is_finite()) {
                return Err(EnsembleError::Configuration(format!(
                    "priors must be non-negative, got {}",
                    p
                )));
            }
        }
        if !(self.plausible_limit > 0.0) {
            return Err(EnsembleError::Configuration(
                "plausible_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ensemble configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Aggregation protocol
    pub strategy: Strategy,
    /// Number of base learner slots
    pub num_learners: usize,
    /// Learner types, cycled over the slots
    pub base_learner_types: Vec<LearnerKind>,
    /// Meta-learner type, stacking only
    pub meta_learner_type: Option<LearnerKind>,
    /// Boosting learning rate
    pub learning_rate: f64,
    /// Bagging bootstrap size as a fraction of the dataset
    pub subsample_ratio: f64,
    /// Base seed; slot `i` uses `seed + i`
    pub seed: u64,
    /// Bagging worker pool size
    pub max_workers: usize,
    /// Route `predict` through the static-prior weighting
    pub use_static_priors: bool,
    pub boosting: BoostingConfig,
    pub priors: WeightingConfig,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Bagging,
            num_learners: 5,
            base_learner_types: vec![
                LearnerKind::DecisionTree,
                LearnerKind::LinearRegression,
                LearnerKind::NeuralNetwork,
            ],
            meta_learner_type: None,
            learning_rate: 0.5,
            subsample_ratio: 1.0,
            seed: 42,
            max_workers: 4,
            use_static_priors: false,
            boosting: BoostingConfig::default(),
            priors: WeightingConfig::default(),
        }
    }
}

impl EnsembleConfig {
    /// Default stacking setup with a linear meta-learner
    pub fn stacking() -> Self {
        Self {
            strategy: Strategy::Stacking,
            meta_learner_type: Some(LearnerKind::LinearRegression),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        if strategy == Strategy::Stacking && self.meta_learner_type.is_none() {
            self.meta_learner_type = Some(LearnerKind::LinearRegression);
        } else if strategy != Strategy::Stacking {
            self.meta_learner_type = None;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_learners == 0 {
            return Err(EnsembleError::Configuration(
                "num_learners must be positive".to_string(),
            ));
        }
        if self.base_learner_types.is_empty() {
            return Err(EnsembleError::EmptyData(
                "base_learner_types is empty".to_string(),
            ));
        }
        match (self.strategy, self.meta_learner_type) {
            (Strategy::Stacking, None) => {
                return Err(EnsembleError::Configuration(
                    "stacking requires a meta_learner_type".to_string(),
                ))
            }
            (Strategy::Bagging | Strategy::Boosting, Some(meta)) => {
                return Err(EnsembleError::Configuration(format!(
                    "meta_learner_type '{}' is only valid for stacking",
                    meta
                )))
            }
            _ => {}
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(EnsembleError::Configuration(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample_ratio > 0.0 && self.subsample_ratio <= 1.0) {
            return Err(EnsembleError::Configuration(format!(
                "subsample_ratio must be in (0, 1], got {}",
                self.subsample_ratio
            )));
        }
        if self.max_workers == 0 {
            return Err(EnsembleError::Configuration(
                "max_workers must be positive".to_string(),
            ));
        }
        let tolerance = self.boosting.correct_tolerance_ratio;
        if !(tolerance > 0.0 && tolerance.is_finite()) {
            return Err(EnsembleError::Configuration(format!(
                "correct_tolerance_ratio must be positive, got {}",
                tolerance
            )));
        }
        if !(self.boosting.error_clamp > 0.0 && self.boosting.error_clamp < 0.5) {
            return Err(EnsembleError::Configuration(
                "error_clamp must be in (0, 0.5)".to_string(),
            ));
        }
        self.priors.validate()
    }
}
