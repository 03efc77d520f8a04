//! Versioned learner table
//!
//! An [`Ensemble`](super::Ensemble) never mutates a published table. Training
//! and online updates build a fresh `LearnerTable` and swap it in whole, so a
//! concurrent `predict` always sees one consistent set of learners and weights.

use crate::learners::BaseLearner;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, error, warn};

/// One owned learner plus its bookkeeping
pub struct LearnerSlot {
    pub(crate) learner: Box<dyn BaseLearner>,
    pub(crate) trained: bool,
    consecutive_failures: AtomicU32,
}

impl LearnerSlot {
    pub fn new(learner: Box<dyn BaseLearner>) -> Self {
        Self {
            learner,
            trained: false,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub(crate) fn trained_with(learner: Box<dyn BaseLearner>) -> Self {
        Self {
            trained: true,
            ..Self::new(learner)
        }
    }

    pub fn name(&self) -> &str {
        self.learner.name()
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn learner(&self) -> &dyn BaseLearner {
        self.learner.as_ref()
    }

    /// Predict failures since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Finite prediction or `None`; failures are logged and counted
    pub(crate) fn predict(&self, features: &[f64]) -> Option<f64> {
        if !self.trained {
            return None;
        }
        match self.learner.predict(features) {
            Ok(value) if value.is_finite() => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                Some(value)
            }
            Ok(value) => {
                debug!("Learner {} produced non-finite prediction {}", self.name(), value);
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) if e.is_learner_local() => {
                warn!("Learner {} failed to predict: {}", self.name(), e);
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                error!("Learner {} failed to predict with unexpected error: {}", self.name(), e);
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
}

impl Clone for LearnerSlot {
    fn clone(&self) -> Self {
        Self {
            learner: self.learner.clone_box(),
            trained: self.trained,
            consecutive_failures: AtomicU32::new(self.consecutive_failures()),
        }
    }
}

impl fmt::Debug for LearnerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearnerSlot")
            .field("name", &self.name())
            .field("trained", &self.trained)
            .field("consecutive_failures", &self.consecutive_failures())
            .finish()
    }
}

/// Outcome of one boosting stage
#[derive(Debug, Clone, PartialEq)]
pub struct BoostStage {
    /// Index of the learner slot
    pub slot: usize,
    /// Whether the learner trained at all
    pub trained: bool,
    /// Weighted error over the full training set (1.0 when training failed)
    pub weighted_error: f64,
    /// Learning rate in effect when the stage trained
    pub stage_rate: f64,
    /// `None` when the stage was skipped (error >= 0.5 or training failed)
    pub confidence: Option<f64>,
}

/// Fitted boosting state
#[derive(Debug, Clone, PartialEq)]
pub struct BoostingModel {
    /// Fixed rate applied at predict time
    pub predict_rate: f64,
    /// Rate after all halvings
    pub final_rate: f64,
    pub stages: Vec<BoostStage>,
}

/// Strategy-specific fitted state
#[derive(Debug, Clone)]
pub(crate) enum StrategyModel {
    Untrained,
    Bagging,
    Boosting(BoostingModel),
    Stacking { meta: Option<LearnerSlot> },
}

/// Immutable snapshot of everything `predict` reads
#[derive(Debug, Clone)]
pub struct LearnerTable {
    pub(crate) slots: Vec<LearnerSlot>,
    pub(crate) model: StrategyModel,
    /// Mean training target; `None` until the first successful train
    pub(crate) default_prediction: Option<f64>,
    pub(crate) n_features: usize,
    pub(crate) feature_names: Vec<String>,
    /// Data the current learners were fitted on, reused by online blending
    pub(crate) reference: Option<crate::data::TrainingDataset>,
    pub(crate) version: u64,
}

impl LearnerTable {
    pub(crate) fn untrained(slots: Vec<LearnerSlot>, meta: Option<LearnerSlot>) -> Self {
        let model = match meta {
            Some(meta) => StrategyModel::Stacking { meta: Some(meta) },
            None => StrategyModel::Untrained,
        };
        Self {
            slots,
            model,
            default_prediction: None,
            n_features: 0,
            feature_names: Vec::new(),
            reference: None,
            version: 0,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.default_prediction.is_some()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn slots(&self) -> &[LearnerSlot] {
        &self.slots
    }

    pub fn trained_count(&self) -> usize {
        self.slots.iter().filter(|s| s.trained).count()
    }

    /// Mean of the finite predictions of all trained slots
    pub(crate) fn mean_prediction(&self, features: &[f64]) -> Option<f64> {
        let preds: Vec<f64> = self
            .slots
            .iter()
            .filter_map(|slot| slot.predict(features))
            .collect();
        crate::data::sampling::finite_mean(&preds)
    }

    pub fn meta_slot(&self) -> Option<&LearnerSlot> {
        match &self.model {
            StrategyModel::Stacking { meta } => meta.as_ref(),
            _ => None,
        }
    }
}
