//! Error types for the ensemble engine

use crate::ensemble::Strategy;
use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, EnsembleError>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum EnsembleError {
    /// Invalid ensemble, learner or online-learning configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// No learners configured, or an empty dataset
    #[error("Empty data: {0}")]
    EmptyData(String),

    /// A single learner failed to train or predict
    #[error("Learner '{learner}' failed: {reason}")]
    LearnerFailure { learner: String, reason: String },

    /// Every learner failed for one call
    #[error("All {attempted} learners failed during {operation}")]
    AllLearnersFailed {
        operation: &'static str,
        attempted: usize,
    },

    /// Predict called before any successful train
    #[error("Model not trained: {0}")]
    NotTrained(String),

    /// Feature vector of the wrong length
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Training interrupted by a cancellation token or deadline
    #[error("Training cancelled: {0}")]
    Cancelled(String),

    /// The configured strategy has no incremental update path
    #[error("Online learning is not supported for the {0} strategy")]
    OnlineLearningUnsupported(Strategy),

    /// Online-learning operation on a disabled controller
    #[error("Online learning is disabled")]
    OnlineLearningDisabled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Config file serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl EnsembleError {
    /// Shorthand for a learner-local failure
    pub fn learner(learner: impl Into<String>, reason: impl Into<String>) -> Self {
        EnsembleError::LearnerFailure {
            learner: learner.into(),
            reason: reason.into(),
        }
    }

    /// Failures that the orchestrator absorbs and logs instead of surfacing
    pub fn is_learner_local(&self) -> bool {
        matches!(
            self,
            EnsembleError::LearnerFailure { .. }
                | EnsembleError::NotTrained(_)
                | EnsembleError::DimensionMismatch { .. }
        )
    }

    /// Errors that make the engine unusable until reconfigured
    pub fn is_fatal(&self) -> bool {
        matches!(self, EnsembleError::Configuration(_))
    }
}
