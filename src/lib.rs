//! Ensemble Learning and Online Adaptation for Crypto Market Prediction
//!
//! This library trains and serves predictions from a heterogeneous set of
//! regressors (decision tree, linear, neural network, LSTM, transformer)
//! combined by bagging, boosting or stacking, and keeps the ensemble fresh
//! with rate-limited online updates and drift detection.
//!
//! # Modules
//!
//! - `data` - samples, datasets, resampling helpers, synthetic market stream
//! - `learners` - the `BaseLearner` contract, concrete learners and factory
//! - `ensemble` - orchestration, aggregation and weighting per strategy
//! - `online` - sample buffer and online adaptation controller
//! - `config` - TOML configuration
//! - `error` - error types
//!
//! # Example
//!
//! ```rust,no_run
//! use crypto_ensemble::prelude::*;
//! use std::sync::Arc;
//!
//! let mut market = SyntheticMarket::new(4, 42);
//! let train = market.dataset(500).unwrap();
//!
//! let ensemble = Ensemble::new(EnsembleConfig::default(), &LearnerFactory::default()).unwrap();
//! ensemble.train(&train).unwrap();
//!
//! let controller =
//!     OnlineAdaptationController::with_config(Arc::new(ensemble), OnlineLearningConfig::default())
//!         .unwrap();
//! for sample in market.take(200) {
//!     controller.add_sample(sample.features, sample.target).unwrap();
//! }
//! println!("{:?}", controller.stats());
//! ```

pub mod config;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod learners;
pub mod online;

// Re-export commonly used types
pub use config::AppConfig;
pub use data::{Sample, SyntheticMarket, TrainingDataset};
pub use ensemble::{CancellationToken, Ensemble, EnsembleConfig, ModelMetrics, Strategy};
pub use error::{EnsembleError, Result};
pub use learners::{BaseLearner, LearnerFactory, LearnerKind};
pub use online::{OnlineAdaptationController, OnlineLearningBuffer, OnlineLearningConfig};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::data::{Sample, SyntheticMarket, TrainingDataset};
    pub use crate::ensemble::{
        CancellationToken, Ensemble, EnsembleConfig, ModelMetrics, Strategy,
    };
    pub use crate::error::{EnsembleError, Result};
    pub use crate::learners::{BaseLearner, LearnerFactory, LearnerKind, LearnerParams};
    pub use crate::online::{
        OnlineAdaptationController, OnlineLearningBuffer, OnlineLearningConfig,
        OnlineLearningStats,
    };
}
