//! AdaBoost-style boosting for regression
//!
//! Stages run strictly in order: each one resamples the training set with
//! the current sample weights, and the stage's correctness pattern reshapes
//! those weights for the next stage.

use super::cancel::CancellationToken;
use super::table::{BoostStage, BoostingModel, LearnerSlot, LearnerTable};
use super::EnsembleConfig;
use crate::data::sampling::{median_absolute_deviation, normalize, weighted_indices};
use crate::data::TrainingDataset;
use crate::error::{EnsembleError, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

/// Absolute error below which a sample counts as correctly predicted
///
/// Constant targets have a zero MAD; the tolerance is then floored at
/// machine epsilon so exact predictions still count.
pub(crate) fn correct_tolerance(targets: &[f64], ratio: f64) -> f64 {
    (ratio * median_absolute_deviation(targets)).max(f64::EPSILON)
}

/// Train the slots sequentially and return them with the fitted stages
pub(crate) fn train(
    slots: &[LearnerSlot],
    dataset: &TrainingDataset,
    config: &EnsembleConfig,
    cancel: &CancellationToken,
) -> Result<(Vec<LearnerSlot>, BoostingModel)> {
    let n = dataset.n_samples();
    let targets = dataset.targets();
    let tolerance = correct_tolerance(targets, config.boosting.correct_tolerance_ratio);

    let mut sample_weights = vec![1.0 / n as f64; n];
    let mut rate = config.learning_rate;
    let mut new_slots = Vec::with_capacity(slots.len());
    let mut stages = Vec::with_capacity(slots.len());

    for (i, slot) in slots.iter().enumerate() {
        cancel.check(&format!("boosting stage {}", i))?;

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(i as u64));
        let sample = dataset.subset(&weighted_indices(&sample_weights, n, &mut rng));

        let mut learner = slot.learner.clone_box();
        if let Err(e) = learner.train(sample.features(), sample.targets()) {
            warn!("Learner {} (stage {}) failed to train: {}", learner.name(), i, e);
            new_slots.push(LearnerSlot::new(slot.learner.clone_box()));
            stages.push(BoostStage {
                slot: i,
                trained: false,
                weighted_error: 1.0,
                stage_rate: rate,
                confidence: None,
            });
            continue;
        }
        let trained = LearnerSlot::trained_with(learner);

        let correct: Vec<bool> = dataset
            .features()
            .iter()
            .zip(targets)
            .map(|(row, &t)| match trained.predict(row) {
                Some(p) => (p - t).abs() < tolerance,
                None => false,
            })
            .collect();
        let error: f64 = sample_weights
            .iter()
            .zip(&correct)
            .filter(|(_, &ok)| !ok)
            .map(|(w, _)| w)
            .sum();

        if error >= 0.5 {
            info!(
                "Stage {} weighted error {:.4} >= 0.5, halving learning rate to {}",
                i,
                error,
                rate * 0.5
            );
            stages.push(BoostStage {
                slot: i,
                trained: true,
                weighted_error: error,
                stage_rate: rate,
                confidence: None,
            });
            new_slots.push(trained);
            rate *= 0.5;
            continue;
        }

        let clamped = error.max(config.boosting.error_clamp);
        let confidence = rate * ((1.0 - clamped) / clamped).ln();
        debug!(
            "Stage {} error {:.4} rate {} confidence {:.4}",
            i, error, rate, confidence
        );

        for (w, &ok) in sample_weights.iter_mut().zip(&correct) {
            *w *= if ok { (-confidence).exp() } else { confidence.exp() };
        }
        normalize(&mut sample_weights);

        stages.push(BoostStage {
            slot: i,
            trained: true,
            weighted_error: error,
            stage_rate: rate,
            confidence: Some(confidence),
        });
        new_slots.push(trained);
    }

    let trained_count = new_slots.iter().filter(|s| s.is_trained()).count();
    if trained_count == 0 {
        return Err(EnsembleError::AllLearnersFailed {
            operation: "boosting train",
            attempted: slots.len(),
        });
    }
    let weighted = stages.iter().filter(|s| s.confidence.is_some()).count();
    info!(
        "Boosting trained {} stages, {} weighted, final rate {}",
        trained_count, weighted, rate
    );

    let model = BoostingModel {
        predict_rate: config.learning_rate,
        final_rate: rate,
        stages,
    };
    Ok((new_slots, model))
}

/// Weighted sum `rate * prediction * confidence` over the weighted stages
///
/// With no usable weighted stage this falls back to the plain mean of the
/// trained learners, then to `default`.
pub(crate) fn predict(
    table: &LearnerTable,
    model: &BoostingModel,
    features: &[f64],
    default: f64,
) -> f64 {
    let mut sum = 0.0;
    let mut used = 0;
    for stage in &model.stages {
        let Some(confidence) = stage.confidence else {
            continue;
        };
        if let Some(p) = table.slots.get(stage.slot).and_then(|s| s.predict(features)) {
            sum += model.predict_rate * p * confidence;
            used += 1;
        }
    }
    if used > 0 {
        sum
    } else {
        table.mean_prediction(features).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::mock::{ConstantLearner, FailingLearner, FnLearner};
    use approx::assert_relative_eq;

    fn dataset() -> TrainingDataset {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64 / 10.0]).collect();
        let y: Vec<f64> = x.iter().map(|r| r[0]).collect();
        TrainingDataset::unnamed(x, y).unwrap()
    }

    fn identity(x: &[f64]) -> f64 {
        x[0]
    }

    #[test]
    fn test_bad_first_stage_halves_rate() {
        let slots = vec![
            LearnerSlot::new(Box::new(ConstantLearner::new(100.0))),
            LearnerSlot::new(Box::new(FnLearner::new(identity))),
        ];
        let config = EnsembleConfig {
            learning_rate: 0.5,
            ..Default::default()
        };
        let (out, model) = train(&slots, &dataset(), &config, &CancellationToken::new()).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(model.stages[0].confidence, None);
        assert_relative_eq!(model.stages[0].weighted_error, 1.0, epsilon = 1e-9);
        assert_relative_eq!(model.stages[0].stage_rate, 0.5);
        assert_relative_eq!(model.stages[1].stage_rate, 0.25);
        assert_relative_eq!(model.final_rate, 0.25);

        // Perfect second stage: error clamps to 1e-10
        let expected = 0.25 * ((1.0 - 1e-10) / 1e-10f64).ln();
        assert_relative_eq!(model.stages[1].confidence.unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_predict_is_weighted_sum() {
        let slots = vec![LearnerSlot::new(Box::new(FnLearner::new(identity)))];
        let config = EnsembleConfig::default();
        let (out, model) = train(&slots, &dataset(), &config, &CancellationToken::new()).unwrap();

        let mut table = LearnerTable::untrained(out, None);
        table.default_prediction = Some(0.0);
        let confidence = model.stages[0].confidence.unwrap();
        let value = predict(&table, &model, &[2.0], 0.0);
        assert_relative_eq!(value, 0.5 * 2.0 * confidence, epsilon = 1e-9);
    }

    #[test]
    fn test_predict_falls_back_without_weighted_stages() {
        let slots = vec![LearnerSlot::new(Box::new(ConstantLearner::new(100.0)))];
        let (out, model) =
            train(&slots, &dataset(), &EnsembleConfig::default(), &CancellationToken::new())
                .unwrap();
        let table = LearnerTable::untrained(out, None);
        assert_eq!(predict(&table, &model, &[0.0], -1.0), 100.0);

        let table = LearnerTable::untrained(
            vec![LearnerSlot::trained_with(Box::new(FailingLearner::on_predict()))],
            None,
        );
        assert_eq!(predict(&table, &model, &[0.0], -1.0), -1.0);
    }

    #[test]
    fn test_all_stages_fail() {
        let slots = vec![LearnerSlot::new(Box::new(FailingLearner::on_train()))];
        let result = train(&slots, &dataset(), &EnsembleConfig::default(), &CancellationToken::new());
        assert!(matches!(result, Err(EnsembleError::AllLearnersFailed { .. })));
    }

    #[test]
    fn test_zero_mad_tolerance() {
        assert_eq!(correct_tolerance(&[1.0, 1.0, 1.0], 0.1), f64::EPSILON);
        assert_relative_eq!(correct_tolerance(&[1.0, 2.0, 3.0], 0.1), 0.1);
    }

    #[test]
    fn test_cancel_between_stages() {
        let token = CancellationToken::new();
        token.cancel();
        let slots = vec![LearnerSlot::new(Box::new(FnLearner::new(identity)))];
        let result = train(&slots, &dataset(), &EnsembleConfig::default(), &token);
        assert!(matches!(result, Err(EnsembleError::Cancelled(_))));
    }
}
