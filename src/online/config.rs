//! Online learning configuration

use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Online adaptation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineLearningConfig {
    /// Start armed when handed to the controller
    pub enabled: bool,
    /// Buffer capacity
    pub buffer_size: usize,
    /// Minimum time between updates
    pub update_interval_secs: u64,
    /// Base blend rate for new samples
    pub learning_rate: f64,
    /// Multiplier applied to the base rate after a poor score
    pub learning_rate_decay: f64,
    /// Floor for the decayed rate
    pub min_learning_rate: f64,
    /// Down-weighting of previously seen data when blending
    pub forget_factor: f64,
    /// Scores below this trigger the decayed rate
    pub performance_threshold: f64,
    /// Batch size and sample-count gate for an update
    pub min_samples_for_update: usize,
    /// Maximum retained performance records
    pub max_history: usize,
    /// Score drop between consecutive updates that counts as drift
    pub drift_threshold: f64,
    /// Buffered samples scored after each update
    pub evaluation_window: usize,
    /// Restore the pre-update learners when an update causes drift
    pub rollback_on_drift: bool,
    /// Run `update_model` from `add_sample` once the gates open
    pub auto_update: bool,
}

impl Default for OnlineLearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 1000,
            update_interval_secs: 60,
            learning_rate: 0.1,
            learning_rate_decay: 0.95,
            min_learning_rate: 0.001,
            forget_factor: 0.99,
            performance_threshold: 0.6,
            min_samples_for_update: 100,
            max_history: 1000,
            drift_threshold: 0.1,
            evaluation_window: 100,
            rollback_on_drift: false,
            auto_update: true,
        }
    }
}

impl OnlineLearningConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(EnsembleError::Configuration(msg));

        if self.buffer_size == 0 {
            return fail("buffer_size must be positive".to_string());
        }
        if self.min_samples_for_update == 0 || self.min_samples_for_update > self.buffer_size {
            return fail(format!(
                "min_samples_for_update must be in 1..={}, got {}",
                self.buffer_size, self.min_samples_for_update
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return fail(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            ));
        }
        if !(self.learning_rate_decay > 0.0 && self.learning_rate_decay <= 1.0) {
            return fail(format!(
                "learning_rate_decay must be in (0, 1], got {}",
                self.learning_rate_decay
            ));
        }
        if !(self.min_learning_rate > 0.0 && self.min_learning_rate <= self.learning_rate) {
            return fail(format!(
                "min_learning_rate must be in (0, learning_rate], got {}",
                self.min_learning_rate
            ));
        }
        if !(self.forget_factor > 0.0 && self.forget_factor <= 1.0) {
            return fail(format!(
                "forget_factor must be in (0, 1], got {}",
                self.forget_factor
            ));
        }
        if !(0.0..=1.0).contains(&self.performance_threshold) {
            return fail(format!(
                "performance_threshold must be in [0, 1], got {}",
                self.performance_threshold
            ));
        }
        if self.max_history == 0 || self.evaluation_window == 0 {
            return fail("max_history and evaluation_window must be positive".to_string());
        }
        if !(self.drift_threshold >= 0.0) {
            return fail(format!(
                "drift_threshold must be non-negative, got {}",
                self.drift_threshold
            ));
        }
        Ok(())
    }
}
