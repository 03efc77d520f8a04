//! Bootstrap aggregating
//!
//! Every slot trains on its own bootstrap sample. Slots are independent, so
//! training fans out over the ensemble's bounded rayon pool.

use super::cancel::CancellationToken;
use super::table::{LearnerSlot, LearnerTable};
use super::EnsembleConfig;
use crate::data::sampling::bootstrap_indices;
use crate::data::TrainingDataset;
use crate::error::{EnsembleError, Result};
use crate::learners::BaseLearner;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::borrow::Cow;
use tracing::{debug, error, warn};

enum FitOutcome {
    Trained(Box<dyn BaseLearner>),
    Failed,
    Cancelled,
}

/// Train a clone of every slot in parallel on `data_for(slot_index)`
///
/// A failed slot is marked untrained, or keeps its previous learner when
/// `keep_previous` is set. Returns the new slots and how many trained.
pub(crate) fn fit_slots<'d, F>(
    pool: &ThreadPool,
    slots: &[LearnerSlot],
    cancel: &CancellationToken,
    keep_previous: bool,
    data_for: F,
) -> Result<(Vec<LearnerSlot>, usize)>
where
    F: Fn(usize) -> Cow<'d, TrainingDataset> + Sync,
{
    let outcomes: Vec<FitOutcome> = pool.install(|| {
        slots
            .par_iter()
            .enumerate()
            .map(|(i, slot)| {
                if cancel.is_cancelled() {
                    return FitOutcome::Cancelled;
                }
                let data = data_for(i);
                let mut learner = slot.learner.clone_box();
                match learner.train(data.features(), data.targets()) {
                    Ok(()) => {
                        debug!("Slot {} ({}) trained on {} rows", i, learner.name(), data.n_samples());
                        FitOutcome::Trained(learner)
                    }
                    Err(e) if e.is_learner_local() => {
                        warn!("Learner {} (slot {}) failed to train: {}", learner.name(), i, e);
                        FitOutcome::Failed
                    }
                    Err(e) => {
                        error!(
                            "Learner {} (slot {}) failed to train with unexpected error: {}",
                            learner.name(),
                            i,
                            e
                        );
                        FitOutcome::Failed
                    }
                }
            })
            .collect()
    });

    if outcomes.iter().any(|o| matches!(o, FitOutcome::Cancelled)) {
        return Err(EnsembleError::Cancelled(
            "parallel learner training".to_string(),
        ));
    }

    let mut trained = 0;
    let new_slots = outcomes
        .into_iter()
        .zip(slots.iter())
        .map(|(outcome, old)| match outcome {
            FitOutcome::Trained(learner) => {
                trained += 1;
                LearnerSlot::trained_with(learner)
            }
            _ if keep_previous => old.clone(),
            _ => LearnerSlot::new(old.learner.clone_box()),
        })
        .collect();

    Ok((new_slots, trained))
}

/// Bootstrap size for a dataset of `n` rows
pub(crate) fn bootstrap_size(n: usize, subsample_ratio: f64) -> usize {
    ((subsample_ratio * n as f64).ceil() as usize).clamp(1, n.max(1))
}

/// Fit every slot on an independent bootstrap of `dataset`
///
/// `round` decorrelates the bootstraps of successive online updates.
pub(crate) fn train(
    pool: &ThreadPool,
    slots: &[LearnerSlot],
    dataset: &TrainingDataset,
    config: &EnsembleConfig,
    round: u64,
    cancel: &CancellationToken,
    keep_previous: bool,
) -> Result<Vec<LearnerSlot>> {
    let n = dataset.n_samples();
    let size = bootstrap_size(n, config.subsample_ratio);
    let base_seed = config.seed.wrapping_add(round.wrapping_mul(1_000_003));

    let (new_slots, trained) = fit_slots(pool, slots, cancel, keep_previous, |i| {
        let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(i as u64));
        Cow::Owned(dataset.subset(&bootstrap_indices(n, size, &mut rng)))
    })?;

    if trained == 0 {
        return Err(EnsembleError::AllLearnersFailed {
            operation: "bagging train",
            attempted: slots.len(),
        });
    }
    debug!("Bagging trained {}/{} learners", trained, slots.len());
    Ok(new_slots)
}

/// Mean over the learners that predict successfully, else the cached default
pub(crate) fn predict(table: &LearnerTable, features: &[f64], default: f64) -> f64 {
    table.mean_prediction(features).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::mock::{FailingLearner, MeanLearner};
    use rayon::ThreadPoolBuilder;

    fn pool() -> ThreadPool {
        ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn dataset() -> TrainingDataset {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| i as f64).collect();
        TrainingDataset::unnamed(x, y).unwrap()
    }

    #[test]
    fn test_bootstrap_size() {
        assert_eq!(bootstrap_size(100, 1.0), 100);
        assert_eq!(bootstrap_size(10, 0.25), 3);
        assert_eq!(bootstrap_size(3, 0.01), 1);
    }

    #[test]
    fn test_failed_slots_are_skipped() {
        let slots = vec![
            LearnerSlot::new(Box::new(MeanLearner::default())),
            LearnerSlot::new(Box::new(FailingLearner::on_train())),
        ];
        let config = EnsembleConfig::default();
        let out = train(&pool(), &slots, &dataset(), &config, 0, &CancellationToken::new(), false)
            .unwrap();
        assert!(out[0].is_trained());
        assert!(!out[1].is_trained());
    }

    #[test]
    fn test_all_failed() {
        let slots = vec![LearnerSlot::new(Box::new(FailingLearner::on_train()))];
        let result = train(
            &pool(),
            &slots,
            &dataset(),
            &EnsembleConfig::default(),
            0,
            &CancellationToken::new(),
            false,
        );
        assert!(matches!(
            result,
            Err(EnsembleError::AllLearnersFailed { attempted: 1, .. })
        ));
    }

    #[test]
    fn test_keep_previous_on_failure() {
        let slots = vec![LearnerSlot::trained_with(Box::new(FailingLearner::on_train()))];
        let (out, trained) =
            fit_slots(&pool(), &slots, &CancellationToken::new(), true, |_| Cow::Owned(dataset())).unwrap();
        assert_eq!(trained, 0);
        assert!(out[0].is_trained());

        let (out, _) =
            fit_slots(&pool(), &slots, &CancellationToken::new(), false, |_| Cow::Owned(dataset())).unwrap();
        assert!(!out[0].is_trained());
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let slots = vec![LearnerSlot::new(Box::new(MeanLearner::default()))];
        let result = train(&pool(), &slots, &dataset(), &EnsembleConfig::default(), 0, &token, false);
        assert!(matches!(result, Err(EnsembleError::Cancelled(_))));
    }
}
