//! Static-prior weighting
//!
//! Weight of a learner = prior for its type x health factor. Implausible
//! predictions are dropped and the remaining weights renormalized.

use super::config::WeightingConfig;
use super::table::{LearnerSlot, LearnerTable};
use tracing::debug;

/// Health multiplier from training state and recent predict failures
pub(crate) fn health_factor(slot: &LearnerSlot, config: &WeightingConfig) -> f64 {
    if !slot.is_trained() {
        return config.untrained_factor;
    }
    match slot.consecutive_failures() {
        0 => config.healthy_factor,
        n => 1.0 / (1.0 + n as f64),
    }
}

/// Unnormalized prior x health weight per slot
pub(crate) fn raw_weights(slots: &[LearnerSlot], config: &WeightingConfig) -> Vec<f64> {
    slots
        .iter()
        .map(|slot| config.prior_for(slot.name()) * health_factor(slot, config))
        .collect()
}

/// Weighted average over the surviving learners, `None` if none survive
pub(crate) fn predict(
    table: &LearnerTable,
    features: &[f64],
    config: &WeightingConfig,
) -> Option<f64> {
    let weights = raw_weights(&table.slots, config);

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (slot, weight) in table.slots.iter().zip(weights) {
        let Some(value) = slot.predict(features) else {
            continue;
        };
        if value.abs() > config.plausible_limit {
            debug!(
                "Dropping implausible prediction {} from {}",
                value,
                slot.name()
            );
            continue;
        }
        weighted_sum += weight * value;
        weight_total += weight;
    }

    if weight_total > 0.0 {
        Some(weighted_sum / weight_total)
    } else {
        None
    }
}
