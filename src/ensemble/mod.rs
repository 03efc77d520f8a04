//! Ensemble orchestration
//!
//! An [`Ensemble`] owns a fixed set of base learners and aggregates them
//! with one of three protocols:
//!
//! - **Bagging**: independent learners on bootstrap samples, averaged
//! - **Boosting**: sequential AdaBoost-style reweighting, confidence-weighted sum
//! - **Stacking**: a meta-learner over the base learners' predictions
//!
//! Per-learner failures are logged and skipped. Only a call where no learner
//! is usable surfaces an error.

mod bagging;
mod boosting;
mod cancel;
mod config;
pub mod metrics;
mod stacking;
mod table;
mod weighting;

pub use cancel::CancellationToken;
pub use config::{BoostingConfig, EnsembleConfig, WeightingConfig};
pub use metrics::ModelMetrics;
pub use table::{BoostStage, BoostingModel, LearnerSlot, LearnerTable};

use crate::data::sampling::{normalize, weighted_indices};
use crate::data::TrainingDataset;
use crate::error::{EnsembleError, Result};
use crate::learners::{BaseLearner, LearnerFactory};
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use table::StrategyModel;
use tracing::{debug, info, warn};

/// Aggregation protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Bagging,
    Boosting,
    Stacking,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Bagging => "bagging",
            Strategy::Boosting => "boosting",
            Strategy::Stacking => "stacking",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Strategy {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bagging" | "random_forest" => Ok(Strategy::Bagging),
            "boosting" | "adaboost" => Ok(Strategy::Boosting),
            "stacking" => Ok(Strategy::Stacking),
            other => Err(EnsembleError::Configuration(format!(
                "unknown ensemble strategy '{}'",
                other
            ))),
        }
    }
}

/// Heterogeneous ensemble of base learners
///
/// The published [`LearnerTable`] sits behind an `RwLock<Arc<_>>`: `predict`
/// clones the `Arc` and releases the lock at once, while training and online
/// updates build a complete new table and swap it in. Writers are serialized
/// by a separate mutex so two updates never race on the same base table.
#[derive(Debug)]
pub struct Ensemble {
    config: EnsembleConfig,
    table: RwLock<Arc<LearnerTable>>,
    writer: Mutex<()>,
    pool: ThreadPool,
}

impl Ensemble {
    /// Build the ensemble's learners from config
    ///
    /// Slot `i` gets type `base_learner_types[i % len]` and seed `seed + i`.
    /// A meta-learner that cannot be built leaves stacking in
    /// bagging-fallback mode instead of failing.
    pub fn new(config: EnsembleConfig, factory: &LearnerFactory) -> Result<Self> {
        config.validate()?;
        let learners = factory
            .build_many(&config.base_learner_types, config.num_learners, config.seed)?
            .into_iter()
            .map(|(_, learner)| learner)
            .collect();

        let meta = match config.meta_learner_type {
            Some(kind) => {
                let seed = config.seed.wrapping_add(config.num_learners as u64);
                match factory.build(kind, seed) {
                    Ok(meta) => Some(meta),
                    Err(e) => {
                        warn!("Meta-learner {} unavailable, stacking degraded: {}", kind, e);
                        None
                    }
                }
            }
            None => None,
        };

        Self::with_learners(config, learners, meta)
    }

    /// Assemble an ensemble around caller-supplied learners
    ///
    /// `num_learners` and `base_learner_types` are not consulted; the
    /// ensemble owns exactly `learners`.
    pub fn with_learners(
        config: EnsembleConfig,
        learners: Vec<Box<dyn BaseLearner>>,
        meta: Option<Box<dyn BaseLearner>>,
    ) -> Result<Self> {
        config.validate()?;
        if learners.is_empty() {
            return Err(EnsembleError::EmptyData("no base learners".to_string()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.max_workers)
            .thread_name(|i| format!("ensemble-worker-{}", i))
            .build()
            .map_err(|e| EnsembleError::Configuration(format!("worker pool: {}", e)))?;

        let slots = learners.into_iter().map(LearnerSlot::new).collect();
        let meta = match config.strategy {
            Strategy::Stacking => meta.map(LearnerSlot::new),
            _ => None,
        };
        info!(
            "Created {} ensemble ({} workers)",
            config.strategy, config.max_workers
        );

        Ok(Self {
            config,
            table: RwLock::new(Arc::new(LearnerTable::untrained(slots, meta))),
            writer: Mutex::new(()),
            pool,
        })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn strategy(&self) -> Strategy {
        self.config.strategy
    }

    pub fn num_learners(&self) -> usize {
        self.snapshot().slots.len()
    }

    pub fn is_trained(&self) -> bool {
        self.snapshot().is_trained()
    }

    /// Monotonic table version, bumped by every swap
    pub fn version(&self) -> u64 {
        self.table.read().version
    }

    /// Feature width of the last training set, 0 before training
    pub fn n_features(&self) -> usize {
        self.table.read().n_features
    }

    /// Feature names of the last training set
    pub fn feature_names(&self) -> Vec<String> {
        self.snapshot().feature_names.clone()
    }

    /// Currently published table
    pub fn snapshot(&self) -> Arc<LearnerTable> {
        self.table.read().clone()
    }

    /// Publish a previously taken snapshot as the next version
    pub fn restore(&self, snapshot: Arc<LearnerTable>) {
        let _guard = self.writer.lock();
        self.republish(&snapshot);
    }

    /// Restore `snapshot` only if `expected_version` is still published
    ///
    /// Returns false, leaving the table alone, when another train or update
    /// swapped in a newer table in the meantime.
    pub fn restore_if_current(&self, snapshot: Arc<LearnerTable>, expected_version: u64) -> bool {
        let _guard = self.writer.lock();
        let version = self.version();
        if version != expected_version {
            warn!(
                "Skipping restore of v{}: table moved on to v{} (expected v{})",
                snapshot.version, version, expected_version
            );
            return false;
        }
        self.republish(&snapshot);
        true
    }

    /// Publish a copy of `snapshot` as the next version; caller holds the writer lock
    fn republish(&self, snapshot: &LearnerTable) {
        let version = self.version() + 1;
        info!("Restored ensemble table v{} as v{}", snapshot.version, version);
        self.publish(LearnerTable {
            version,
            ..snapshot.clone()
        });
    }

    fn publish(&self, table: LearnerTable) {
        *self.table.write() = Arc::new(table);
    }

    /// Full (re)training on `dataset`
    pub fn train(&self, dataset: &TrainingDataset) -> Result<()> {
        self.train_with_cancel(dataset, &CancellationToken::new())
    }

    /// Full training, checking `cancel` between learners
    ///
    /// The previous table stays published if training fails or is cancelled.
    pub fn train_with_cancel(
        &self,
        dataset: &TrainingDataset,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _guard = self.writer.lock();
        let current = self.snapshot();
        info!(
            "Training {} ensemble: {} learners, {} samples, {} features",
            self.config.strategy,
            current.slots.len(),
            dataset.n_samples(),
            dataset.n_features()
        );

        let (slots, model) = match self.config.strategy {
            Strategy::Bagging => {
                let slots = bagging::train(
                    &self.pool,
                    &current.slots,
                    dataset,
                    &self.config,
                    0,
                    cancel,
                    false,
                )?;
                (slots, StrategyModel::Bagging)
            }
            Strategy::Boosting => {
                let (slots, model) =
                    boosting::train(&current.slots, dataset, &self.config, cancel)?;
                (slots, StrategyModel::Boosting(model))
            }
            Strategy::Stacking => {
                let (slots, meta) = stacking::train(
                    &self.pool,
                    &current.slots,
                    current.meta_slot(),
                    dataset,
                    cancel,
                    false,
                )?;
                (slots, StrategyModel::Stacking { meta })
            }
        };

        let table = LearnerTable {
            slots,
            model,
            default_prediction: Some(dataset.mean_target()),
            n_features: dataset.n_features(),
            feature_names: dataset.feature_names().to_vec(),
            reference: Some(dataset.clone()),
            version: current.version + 1,
        };
        info!(
            "Ensemble trained: {}/{} learners usable, table v{}",
            table.trained_count(),
            table.slots.len(),
            table.version
        );
        self.publish(table);
        Ok(())
    }

    /// Incremental update from a batch of recent samples
    ///
    /// The batch is blended with the data the current learners were fitted
    /// on: each new row is drawn with total weight `rate`, each old row with
    /// total weight `(1 - rate) * forget_factor`. Bagging retrains every slot
    /// on a fresh bootstrap of the blend; stacking refits the base learners
    /// and the meta-learner on it. Learners that fail keep their previous
    /// state. Boosting has no incremental path.
    ///
    /// Returns the table the update replaced, taken under the writer lock,
    /// so callers can roll back to exactly the pre-update state.
    pub fn update_incremental(
        &self,
        batch: &TrainingDataset,
        rate: f64,
        forget_factor: f64,
        cancel: &CancellationToken,
    ) -> Result<Arc<LearnerTable>> {
        if self.config.strategy == Strategy::Boosting {
            return Err(EnsembleError::OnlineLearningUnsupported(Strategy::Boosting));
        }
        let _guard = self.writer.lock();
        let current = self.snapshot();
        if !current.is_trained() {
            return Err(EnsembleError::NotTrained(
                "incremental update needs a trained ensemble".to_string(),
            ));
        }
        if batch.n_features() != current.n_features {
            return Err(EnsembleError::DimensionMismatch {
                expected: current.n_features,
                actual: batch.n_features(),
            });
        }

        let round = current.version + 1;
        let blended = match &current.reference {
            Some(reference) => blend(
                reference,
                batch,
                rate,
                forget_factor,
                self.config.seed.wrapping_add(round),
            )?,
            None => batch.clone(),
        };
        debug!(
            "Incremental {} update: {} new rows blended into {} (rate {:.4})",
            self.config.strategy,
            batch.n_samples(),
            blended.n_samples(),
            rate
        );

        let (slots, model) = match self.config.strategy {
            Strategy::Bagging => {
                let slots = bagging::train(
                    &self.pool,
                    &current.slots,
                    &blended,
                    &self.config,
                    round,
                    cancel,
                    true,
                )?;
                (slots, StrategyModel::Bagging)
            }
            Strategy::Stacking => {
                let (slots, meta) = stacking::train(
                    &self.pool,
                    &current.slots,
                    current.meta_slot(),
                    &blended,
                    cancel,
                    true,
                )?;
                (slots, StrategyModel::Stacking { meta })
            }
            Strategy::Boosting => {
                return Err(EnsembleError::OnlineLearningUnsupported(Strategy::Boosting))
            }
        };

        self.publish(LearnerTable {
            slots,
            model,
            default_prediction: Some(blended.mean_target()),
            n_features: current.n_features,
            feature_names: current.feature_names.clone(),
            reference: Some(blended),
            version: round,
        });
        Ok(current)
    }

    fn trained_table(&self, features: &[f64]) -> Result<(Arc<LearnerTable>, f64)> {
        let table = self.snapshot();
        let Some(default) = table.default_prediction else {
            return Err(EnsembleError::NotTrained(
                "ensemble has not been trained".to_string(),
            ));
        };
        if features.len() != table.n_features {
            return Err(EnsembleError::DimensionMismatch {
                expected: table.n_features,
                actual: features.len(),
            });
        }
        Ok((table, default))
    }

    /// Aggregate prediction for one row
    ///
    /// Fails only when the ensemble was never trained or the row has the
    /// wrong width; otherwise falls back down to the mean training target.
    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        if self.config.use_static_priors {
            return self.predict_weighted(features);
        }
        let (table, default) = self.trained_table(features)?;
        let value = match &table.model {
            StrategyModel::Boosting(model) => boosting::predict(&table, model, features, default),
            StrategyModel::Stacking { meta } => {
                stacking::predict(&table, meta.as_ref(), features, default)
            }
            StrategyModel::Bagging | StrategyModel::Untrained => {
                bagging::predict(&table, features, default)
            }
        };
        Ok(value)
    }

    /// Prediction under the static-prior weighting, regardless of strategy
    pub fn predict_weighted(&self, features: &[f64]) -> Result<f64> {
        let (table, default) = self.trained_table(features)?;
        Ok(weighting::predict(&table, features, &self.config.priors).unwrap_or(default))
    }

    /// Predict every row of a matrix
    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict(row)).collect()
    }

    /// Stacking meta-features for one row, one column per base learner
    pub fn meta_features(&self, features: &[f64]) -> Result<Vec<f64>> {
        let (table, _) = self.trained_table(features)?;
        Ok(stacking::meta_features(&table.slots, features))
    }

    /// Boosting stages of the current table
    pub fn boosting_model(&self) -> Option<BoostingModel> {
        match &self.snapshot().model {
            StrategyModel::Boosting(model) => Some(model.clone()),
            _ => None,
        }
    }

    /// Per-slot weights, recomputed from the current table
    ///
    /// Bagging and stacking weight trained learners equally; boosting
    /// reports stage confidences; static-prior mode reports normalized
    /// prior x health weights.
    pub fn weights(&self) -> Vec<f64> {
        let table = self.snapshot();
        if self.config.use_static_priors {
            let mut weights = weighting::raw_weights(&table.slots, &self.config.priors);
            normalize(&mut weights);
            return weights;
        }
        match &table.model {
            StrategyModel::Boosting(model) => {
                let mut weights = vec![0.0; table.slots.len()];
                for stage in &model.stages {
                    if let (Some(c), Some(w)) = (stage.confidence, weights.get_mut(stage.slot)) {
                        *w = c;
                    }
                }
                weights
            }
            _ => {
                let trained = table.trained_count();
                table
                    .slots
                    .iter()
                    .map(|s| {
                        if s.is_trained() && trained > 0 {
                            1.0 / trained as f64
                        } else {
                            0.0
                        }
                    })
                    .collect()
            }
        }
    }

    /// Metrics of the ensemble's predictions on `dataset`
    pub fn evaluate(&self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
        let predictions = self.predict_batch(dataset.features())?;
        Ok(ModelMetrics::calculate(dataset.targets(), &predictions))
    }

    /// Mean of the normalized importances reported by trained learners
    ///
    /// Learners reporting no importance (or the wrong width) are left out.
    /// Empty when no learner reports importance.
    pub fn feature_importance(&self) -> Vec<f64> {
        let table = self.snapshot();
        let n = table.n_features;
        let mut total = vec![0.0; n];
        let mut contributors = 0;

        for slot in table.slots.iter().filter(|s| s.is_trained()) {
            let mut importance = slot.learner.feature_importance();
            if importance.len() != n {
                continue;
            }
            normalize(&mut importance);
            for (t, v) in total.iter_mut().zip(importance) {
                *t += v;
            }
            contributors += 1;
        }

        if contributors == 0 {
            return Vec::new();
        }
        normalize(&mut total);
        total
    }

    /// Feature names paired with importance, most important first
    pub fn feature_importance_ranking(&self) -> Vec<(String, f64)> {
        let names = self.feature_names();
        let mut ranking: Vec<(String, f64)> = names
            .into_iter()
            .zip(self.feature_importance())
            .collect();
        ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranking
    }
}

/// Weighted resample of `reference` and `batch` into a set the size of the larger
fn blend(
    reference: &TrainingDataset,
    batch: &TrainingDataset,
    rate: f64,
    forget_factor: f64,
    seed: u64,
) -> Result<TrainingDataset> {
    let n_old = reference.n_samples();
    let n_new = batch.n_samples();

    let mut combined = reference.clone();
    combined.extend(batch)?;

    let old_weight = (1.0 - rate).max(0.0) * forget_factor / n_old as f64;
    let new_weight = rate / n_new as f64;
    let weights: Vec<f64> = std::iter::repeat(old_weight)
        .take(n_old)
        .chain(std::iter::repeat(new_weight).take(n_new))
        .collect();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let indices = weighted_indices(&weights, n_old.max(n_new), &mut rng);
    Ok(combined.subset(&indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::mock::{
        ConstantLearner, FailingLearner, FnLearner, MeanLearner, OneShotLearner,
    };
    use crate::learners::LearnerKind;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

    fn dataset() -> TrainingDataset {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64 / 10.0, 1.0]).collect();
        let y: Vec<f64> = x.iter().map(|r| r[0]).collect();
        TrainingDataset::unnamed(x, y).unwrap()
    }

    fn boxed(learners: Vec<Box<dyn BaseLearner>>) -> Vec<Box<dyn BaseLearner>> {
        learners
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(Strategy::Boosting.to_string(), "boosting");
        assert_eq!("random_forest".parse::<Strategy>().unwrap(), Strategy::Bagging);
        assert!("voting".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_predict_before_train() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::default(),
            boxed(vec![Box::new(ConstantLearner::new(1.0))]),
            None,
        )
        .unwrap();
        assert!(matches!(
            ensemble.predict(&[0.0, 0.0]),
            Err(EnsembleError::NotTrained(_))
        ));
        assert_eq!(ensemble.version(), 0);
    }

    #[test]
    fn test_bagging_skips_failing_predictor() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::default(),
            boxed(vec![
                Box::new(ConstantLearner::new(1.0)),
                Box::new(FailingLearner::on_predict()),
                Box::new(ConstantLearner::new(3.0)),
            ]),
            None,
        )
        .unwrap();
        ensemble.train(&dataset()).unwrap();
        assert_relative_eq!(ensemble.predict(&[0.5, 1.0]).unwrap(), 2.0);
        assert_eq!(ensemble.version(), 1);
    }

    #[test]
    fn test_bagging_default_when_all_predictions_fail() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::default(),
            boxed(vec![Box::new(FailingLearner::on_predict())]),
            None,
        )
        .unwrap();
        let data = dataset();
        ensemble.train(&data).unwrap();
        assert_relative_eq!(ensemble.predict(&[0.5, 1.0]).unwrap(), data.mean_target());
    }

    #[test]
    fn test_train_fails_only_when_every_learner_fails() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::default(),
            boxed(vec![
                Box::new(FailingLearner::on_train()),
                Box::new(FailingLearner::on_train()),
            ]),
            None,
        )
        .unwrap();
        assert!(matches!(
            ensemble.train(&dataset()),
            Err(EnsembleError::AllLearnersFailed { attempted: 2, .. })
        ));
        assert!(!ensemble.is_trained());
    }

    #[test]
    fn test_dimension_mismatch() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::default(),
            boxed(vec![Box::new(ConstantLearner::new(1.0))]),
            None,
        )
        .unwrap();
        ensemble.train(&dataset()).unwrap();
        assert!(matches!(
            ensemble.predict(&[1.0]),
            Err(EnsembleError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_cancelled_train_keeps_previous_table() {
        let constant = ConstantLearner::new(1.0);
        let calls = constant.train_calls.clone();
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::default(),
            boxed(vec![Box::new(constant)]),
            None,
        )
        .unwrap();
        ensemble.train(&dataset()).unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);

        let token = CancellationToken::new();
        token.cancel();
        let result = ensemble.train_with_cancel(&dataset(), &token);
        assert!(matches!(result, Err(EnsembleError::Cancelled(_))));
        assert_eq!(ensemble.version(), 1);
        assert_relative_eq!(ensemble.predict(&[0.0, 1.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_stacking_meta_features_zero_filled() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::stacking(),
            boxed(vec![
                Box::new(FnLearner::new(|x| x[0])),
                Box::new(FailingLearner::on_predict()),
                Box::new(ConstantLearner::new(2.0)),
            ]),
            Some(Box::new(MeanLearner::default())),
        )
        .unwrap();
        ensemble.train(&dataset()).unwrap();

        let row = ensemble.meta_features(&[1.5, 1.0]).unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row, vec![1.5, 0.0, 2.0]);
    }

    #[test]
    fn test_stacking_without_meta_uses_base_average() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::stacking(),
            boxed(vec![
                Box::new(ConstantLearner::new(1.0)),
                Box::new(ConstantLearner::new(2.0)),
            ]),
            None,
        )
        .unwrap();
        ensemble.train(&dataset()).unwrap();
        assert_relative_eq!(ensemble.predict(&[0.0, 1.0]).unwrap(), 1.5);
    }

    #[test]
    fn test_boosting_rejects_incremental_update() {
        let config = EnsembleConfig::default().with_strategy(Strategy::Boosting);
        let ensemble = Ensemble::with_learners(
            config,
            boxed(vec![Box::new(FnLearner::new(|x| x[0]))]),
            None,
        )
        .unwrap();
        ensemble.train(&dataset()).unwrap();
        let result = ensemble.update_incremental(&dataset(), 0.1, 1.0, &CancellationToken::new());
        assert!(matches!(
            result,
            Err(EnsembleError::OnlineLearningUnsupported(Strategy::Boosting))
        ));
    }

    #[test]
    fn test_incremental_update_bumps_version() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::default(),
            boxed(vec![Box::new(MeanLearner::default())]),
            None,
        )
        .unwrap();
        assert!(ensemble
            .update_incremental(&dataset(), 0.5, 1.0, &CancellationToken::new())
            .is_err());

        ensemble.train(&dataset()).unwrap();
        let before = ensemble.predict(&[0.0, 1.0]).unwrap();

        // New regime: all targets at 10
        let shifted = TrainingDataset::unnamed(vec![vec![0.0, 1.0]; 30], vec![10.0; 30]).unwrap();
        ensemble
            .update_incremental(&shifted, 1.0, 1.0, &CancellationToken::new())
            .unwrap();
        assert_eq!(ensemble.version(), 2);
        let after = ensemble.predict(&[0.0, 1.0]).unwrap();
        assert!(after > before);
        assert_relative_eq!(after, 10.0);
    }

    #[test]
    fn test_weights_by_strategy() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::default(),
            boxed(vec![
                Box::new(ConstantLearner::new(1.0)),
                Box::new(FailingLearner::on_train()),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(ensemble.weights(), vec![0.0, 0.0]);
        ensemble.train(&dataset()).unwrap();
        assert_eq!(ensemble.weights(), vec![1.0, 0.0]);

        let config = EnsembleConfig {
            use_static_priors: true,
            ..Default::default()
        };
        let ensemble = Ensemble::with_learners(
            config,
            boxed(vec![
                Box::new(ConstantLearner::new(1.0)),
                Box::new(ConstantLearner::new(30.0)),
            ]),
            None,
        )
        .unwrap();
        ensemble.train(&dataset()).unwrap();
        let weights = ensemble.weights();
        assert_relative_eq!(weights.iter().sum::<f64>(), 1.0);
        // 30.0 is implausible and dropped from the weighted prediction
        assert_relative_eq!(ensemble.predict(&[0.0, 1.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_feature_importance_ranking() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::default(),
            boxed(vec![
                Box::new(FnLearner::new(|x| x[0]).with_importance(vec![3.0, 1.0])),
                Box::new(FnLearner::new(|x| x[0]).with_importance(vec![1.0, 1.0])),
                Box::new(ConstantLearner::new(0.0)),
            ]),
            None,
        )
        .unwrap();
        assert!(ensemble.feature_importance().is_empty());
        ensemble.train(&dataset()).unwrap();

        let importance = ensemble.feature_importance();
        assert_relative_eq!(importance[0], 0.625);
        assert_relative_eq!(importance[1], 0.375);

        let ranking = ensemble.feature_importance_ranking();
        assert_eq!(ranking[0].0, "f0");
    }

    #[test]
    fn test_snapshot_restore() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::default(),
            boxed(vec![Box::new(MeanLearner::default())]),
            None,
        )
        .unwrap();
        ensemble.train(&dataset()).unwrap();
        let good = ensemble.snapshot();
        let good_value = ensemble.predict(&[0.0, 1.0]).unwrap();

        let shifted = TrainingDataset::unnamed(vec![vec![0.0, 1.0]; 5], vec![-4.0; 5]).unwrap();
        ensemble.train(&shifted).unwrap();
        assert_relative_eq!(ensemble.predict(&[0.0, 1.0]).unwrap(), -4.0);

        ensemble.restore(good);
        assert_eq!(ensemble.version(), 3);
        assert_relative_eq!(ensemble.predict(&[0.0, 1.0]).unwrap(), good_value);
    }

    #[test]
    fn test_new_from_factory() {
        let config = EnsembleConfig {
            num_learners: 4,
            base_learner_types: vec![LearnerKind::LinearRegression, LearnerKind::DecisionTree],
            ..Default::default()
        };
        let ensemble = Ensemble::new(config, &LearnerFactory::default()).unwrap();
        assert_eq!(ensemble.num_learners(), 4);
        let names: Vec<String> = ensemble
            .snapshot()
            .slots()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names[0], "linear_regression");
        assert_eq!(names[1], "decision_tree");
    }

    #[test]
    fn test_update_fails_when_every_refit_fails() {
        for config in [EnsembleConfig::default(), EnsembleConfig::stacking()] {
            let strategy = config.strategy;
            let ensemble = Ensemble::with_learners(
                config,
                boxed(vec![Box::new(OneShotLearner::default())]),
                Some(Box::new(MeanLearner::default())),
            )
            .unwrap();
            ensemble.train(&dataset()).unwrap();
            let before = ensemble.predict(&[0.0, 1.0]).unwrap();

            let result =
                ensemble.update_incremental(&dataset(), 0.5, 1.0, &CancellationToken::new());
            assert!(
                matches!(result, Err(EnsembleError::AllLearnersFailed { attempted: 1, .. })),
                "{} update should fail",
                strategy
            );
            assert_eq!(ensemble.version(), 1);
            assert_relative_eq!(ensemble.predict(&[0.0, 1.0]).unwrap(), before);
        }
    }

    #[test]
    fn test_update_returns_replaced_table() {
        let ensemble = Ensemble::with_learners(
            EnsembleConfig::default(),
            boxed(vec![Box::new(MeanLearner::default())]),
            None,
        )
        .unwrap();
        ensemble.train(&dataset()).unwrap();
        let before = ensemble.predict(&[0.0, 1.0]).unwrap();

        let shifted = TrainingDataset::unnamed(vec![vec![0.0, 1.0]; 30], vec![10.0; 30]).unwrap();
        let previous = ensemble
            .update_incremental(&shifted, 1.0, 1.0, &CancellationToken::new())
            .unwrap();
        assert_eq!(previous.version(), 1);
        assert_eq!(ensemble.version(), 2);

        // A train published after the update makes that rollback stale
        ensemble.train(&shifted).unwrap();
        assert!(!ensemble.restore_if_current(Arc::clone(&previous), 2));
        assert_eq!(ensemble.version(), 3);
        assert_relative_eq!(ensemble.predict(&[0.0, 1.0]).unwrap(), 10.0);

        assert!(ensemble.restore_if_current(previous, 3));
        assert_eq!(ensemble.version(), 4);
        assert_relative_eq!(ensemble.predict(&[0.0, 1.0]).unwrap(), before);
    }

    #[test]
    fn test_concurrent_predict_sees_whole_tables() {
        let learners: Vec<Box<dyn BaseLearner>> = (0..4)
            .map(|_| Box::new(MeanLearner::default()) as Box<dyn BaseLearner>)
            .collect();
        let ensemble = Ensemble::with_learners(EnsembleConfig::default(), learners, None).unwrap();
        let low = TrainingDataset::unnamed(vec![vec![0.0, 1.0]; 20], vec![1.0; 20]).unwrap();
        let high = TrainingDataset::unnamed(vec![vec![0.0, 1.0]; 20], vec![3.0; 20]).unwrap();
        ensemble.train(&low).unwrap();

        let done = AtomicBool::new(false);
        std::thread::scope(|scope| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut seen = 0usize;
                        loop {
                            let value = ensemble.predict(&[0.0, 1.0]).unwrap();
                            assert!(value == 1.0 || value == 3.0, "mixed table: {}", value);
                            seen += 1;
                            if done.load(AtomicOrdering::SeqCst) {
                                break seen;
                            }
                        }
                    })
                })
                .collect();

            for round in 0..40 {
                if round % 2 == 0 {
                    ensemble
                        .update_incremental(&high, 1.0, 1.0, &CancellationToken::new())
                        .unwrap();
                } else {
                    ensemble.train(&low).unwrap();
                }
            }
            done.store(true, AtomicOrdering::SeqCst);

            for reader in readers {
                assert!(reader.join().unwrap() > 0);
            }
        });
        assert_eq!(ensemble.version(), 41);
    }

    #[test]
    fn test_blend_respects_rate() {
        let old = TrainingDataset::unnamed(vec![vec![0.0]; 100], vec![0.0; 100]).unwrap();
        let new = TrainingDataset::unnamed(vec![vec![1.0]; 10], vec![1.0; 10]).unwrap();

        let all_new = blend(&old, &new, 1.0, 1.0, 7).unwrap();
        assert_eq!(all_new.n_samples(), 100);
        assert!(all_new.targets().iter().all(|&t| t == 1.0));

        let mixed = blend(&old, &new, 0.3, 1.0, 7).unwrap();
        let share = mixed.targets().iter().sum::<f64>() / 100.0;
        assert!(share > 0.1 && share < 0.5, "share {}", share);
    }
}
