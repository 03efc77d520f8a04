//! Two-level stacking
//!
//! Base learners fit the full dataset; the meta-learner fits their
//! per-row predictions. Without a usable meta-learner the ensemble keeps
//! serving from the base learners in bagging-fallback mode.

use super::bagging::fit_slots;
use super::cancel::CancellationToken;
use super::table::{LearnerSlot, LearnerTable};
use crate::data::sampling::finite_mean;
use crate::data::TrainingDataset;
use crate::error::{EnsembleError, Result};
use rayon::ThreadPool;
use std::borrow::Cow;
use tracing::{debug, warn};

/// One column per base learner; failed or untrained learners contribute 0.0
pub(crate) fn meta_features(slots: &[LearnerSlot], features: &[f64]) -> Vec<f64> {
    slots
        .iter()
        .map(|slot| slot.predict(features).unwrap_or(0.0))
        .collect()
}

/// Fit base learners, then the meta-learner on their predictions
///
/// With `keep_previous` (online refits) a learner that fails keeps its
/// previous fitted state instead of dropping out. Either way the call fails
/// when no base learner trains.
pub(crate) fn train(
    pool: &ThreadPool,
    slots: &[LearnerSlot],
    meta: Option<&LearnerSlot>,
    dataset: &TrainingDataset,
    cancel: &CancellationToken,
    keep_previous: bool,
) -> Result<(Vec<LearnerSlot>, Option<LearnerSlot>)> {
    let (base, trained) = fit_slots(pool, slots, cancel, keep_previous, |_| {
        Cow::Borrowed(dataset)
    })?;
    if trained == 0 {
        return Err(EnsembleError::AllLearnersFailed {
            operation: "stacking base train",
            attempted: slots.len(),
        });
    }

    cancel.check("stacking meta-learner")?;

    let Some(meta) = meta else {
        warn!("No meta-learner available; stacking runs in bagging-fallback mode");
        return Ok((base, None));
    };

    let rows: Vec<Vec<f64>> = dataset
        .features()
        .iter()
        .map(|row| meta_features(&base, row))
        .collect();

    let mut learner = meta.learner.clone_box();
    let meta = match learner.train(&rows, dataset.targets()) {
        Ok(()) => {
            debug!(
                "Meta-learner {} trained on {} meta-features",
                learner.name(),
                base.len()
            );
            LearnerSlot::trained_with(learner)
        }
        Err(e) => {
            warn!(
                "Meta-learner {} failed to train, using base-learner average: {}",
                learner.name(),
                e
            );
            if keep_previous {
                meta.clone()
            } else {
                LearnerSlot::new(meta.learner.clone_box())
            }
        }
    };
    Ok((base, Some(meta)))
}

/// Meta-learner output, else the mean of the non-zero base predictions,
/// else `default`
pub(crate) fn predict(
    table: &LearnerTable,
    meta: Option<&LearnerSlot>,
    features: &[f64],
    default: f64,
) -> f64 {
    let row = meta_features(&table.slots, features);
    if let Some(value) = meta.and_then(|m| m.predict(&row)) {
        return value;
    }
    let non_zero: Vec<f64> = row.into_iter().filter(|v| *v != 0.0).collect();
    finite_mean(&non_zero).unwrap_or(default)
}
