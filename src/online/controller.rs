//! Online adaptation controller
//!
//! Wraps an [`Ensemble`], buffers fresh samples and decides when to run a
//! bounded incremental update. After every update the ensemble is scored on
//! the buffer tail; a score drop larger than `drift_threshold` flags drift.

use super::buffer::OnlineLearningBuffer;
use super::config::OnlineLearningConfig;
use crate::data::{Sample, TrainingDataset};
use crate::ensemble::metrics::{directional_accuracy, DIRECTION_DEADBAND};
use crate::ensemble::{CancellationToken, Ensemble, LearnerTable, Strategy};
use crate::error::{EnsembleError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Disabled,
    Armed,
    Updating,
    /// Waiting out `update_interval` after an update
    Cooldown,
}

/// Score recorded after one completed update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub timestamp: DateTime<Utc>,
    /// Directional accuracy on the buffer tail
    pub score: f64,
    /// Blend rate used by the update
    pub learning_rate: f64,
    /// Table version after the update
    pub model_version: u64,
}

/// Result of one `update_model` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub samples_used: usize,
    pub learning_rate: f64,
    pub score: f64,
    pub drift_detected: bool,
    pub rolled_back: bool,
    pub model_version: u64,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineLearningStats {
    pub enabled: bool,
    pub state: ControllerState,
    pub buffer_size: usize,
    pub buffer_capacity: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub performance_history: Vec<f64>,
    pub current_learning_rate: f64,
    pub drift_detected: bool,
    pub update_count: u64,
    pub samples_since_update: usize,
    pub model_version: u64,
}

#[derive(Debug)]
struct Inner {
    state: ControllerState,
    config: OnlineLearningConfig,
    buffer: Option<Arc<OnlineLearningBuffer>>,
    last_update: Option<Instant>,
    last_update_at: Option<DateTime<Utc>>,
    samples_since_update: usize,
    history: VecDeque<PerformanceRecord>,
    current_rate: f64,
    drift_detected: bool,
    update_count: u64,
}

impl Inner {
    /// Leave cooldown once the interval has elapsed
    fn refresh(&mut self) {
        if self.state == ControllerState::Cooldown && self.interval_elapsed() {
            self.state = ControllerState::Armed;
        }
    }

    fn interval_elapsed(&self) -> bool {
        match self.last_update {
            Some(at) => at.elapsed() >= self.config.update_interval(),
            None => true,
        }
    }

    fn is_enabled(&self) -> bool {
        self.state != ControllerState::Disabled
    }

    fn should_update(&self) -> bool {
        let Some(buffer) = &self.buffer else {
            return false;
        };
        let min = self.config.min_samples_for_update;
        matches!(self.state, ControllerState::Armed | ControllerState::Cooldown)
            && buffer.len() >= min
            && self.samples_since_update >= min
            && self.interval_elapsed()
    }

    /// `Disabled` if `disable` ran while the update was in flight
    fn state_after_update(&self) -> ControllerState {
        if self.buffer.is_none() {
            ControllerState::Disabled
        } else if self.config.update_interval_secs > 0 {
            ControllerState::Cooldown
        } else {
            ControllerState::Armed
        }
    }
}

/// Result of one incremental pass, before bookkeeping
struct AppliedUpdate {
    samples_used: usize,
    score: f64,
    /// Table the update replaced
    previous: Arc<LearnerTable>,
    /// Version the update published
    version: u64,
}

/// Base rate, or the decayed rate when the latest score is below threshold
pub fn scheduled_rate(config: &OnlineLearningConfig, latest_score: Option<f64>) -> f64 {
    match latest_score {
        Some(score) if score < config.performance_threshold => {
            (config.learning_rate * config.learning_rate_decay).max(config.min_learning_rate)
        }
        _ => config.learning_rate,
    }
}

/// Decides when and how the ensemble adapts to streaming samples
#[derive(Debug)]
pub struct OnlineAdaptationController {
    ensemble: Arc<Ensemble>,
    inner: Mutex<Inner>,
}

impl OnlineAdaptationController {
    /// Controller in the `Disabled` state
    pub fn new(ensemble: Arc<Ensemble>) -> Self {
        let config = OnlineLearningConfig::default();
        let current_rate = config.learning_rate;
        Self {
            ensemble,
            inner: Mutex::new(Inner {
                state: ControllerState::Disabled,
                config,
                buffer: None,
                last_update: None,
                last_update_at: None,
                samples_since_update: 0,
                history: VecDeque::new(),
                current_rate,
                drift_detected: false,
                update_count: 0,
            }),
        }
    }

    /// Controller that is enabled right away when `config.enabled` is set
    pub fn with_config(ensemble: Arc<Ensemble>, config: OnlineLearningConfig) -> Result<Self> {
        config.validate()?;
        let controller = Self::new(ensemble);
        if config.enabled {
            controller.enable(config)?;
        } else {
            controller.inner.lock().config = config;
        }
        Ok(controller)
    }

    pub fn ensemble(&self) -> &Arc<Ensemble> {
        &self.ensemble
    }

    /// Arm the controller with a fresh buffer
    ///
    /// Boosting has no incremental path, so enabling it is refused. Called
    /// during an update, the controller stays `Updating` until it completes.
    pub fn enable(&self, config: OnlineLearningConfig) -> Result<()> {
        config.validate()?;
        if self.ensemble.strategy() == Strategy::Boosting {
            return Err(EnsembleError::OnlineLearningUnsupported(Strategy::Boosting));
        }

        let mut inner = self.inner.lock();
        inner.buffer = Some(Arc::new(OnlineLearningBuffer::new(config.buffer_size)));
        inner.current_rate = scheduled_rate(&config, inner.history.back().map(|r| r.score));
        inner.samples_since_update = 0;
        // An in-flight update settles the state itself when it finishes
        if inner.state != ControllerState::Updating {
            inner.state = ControllerState::Armed;
        }
        info!(
            "Online learning enabled: buffer {}, min samples {}, interval {}s",
            config.buffer_size, config.min_samples_for_update, config.update_interval_secs
        );
        inner.config = config;
        Ok(())
    }

    /// Drop the buffer and return to `Disabled`
    pub fn disable(&self) {
        let mut inner = self.inner.lock();
        if let Some(buffer) = inner.buffer.take() {
            buffer.clear();
        }
        inner.samples_since_update = 0;
        inner.state = ControllerState::Disabled;
        info!("Online learning disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().is_enabled()
    }

    pub fn state(&self) -> ControllerState {
        let mut inner = self.inner.lock();
        inner.refresh();
        inner.state
    }

    pub fn config(&self) -> OnlineLearningConfig {
        self.inner.lock().config.clone()
    }

    fn buffer(&self) -> Result<Arc<OnlineLearningBuffer>> {
        self.inner
            .lock()
            .buffer
            .clone()
            .ok_or(EnsembleError::OnlineLearningDisabled)
    }

    /// Buffer a sample; runs an update when auto-update is on and the gates
    /// open. Returns whether an update ran.
    ///
    /// Auto-update failures are logged, not returned, unless they are fatal
    /// configuration errors; the sample-count gate then waits for a fresh
    /// batch before retrying.
    pub fn add_sample(&self, features: Vec<f64>, target: f64) -> Result<bool> {
        let n_features = self.ensemble.n_features();
        if n_features > 0 && features.len() != n_features {
            return Err(EnsembleError::DimensionMismatch {
                expected: n_features,
                actual: features.len(),
            });
        }

        let auto_update = {
            let mut inner = self.inner.lock();
            let buffer = inner
                .buffer
                .clone()
                .ok_or(EnsembleError::OnlineLearningDisabled)?;
            buffer.add_sample(Sample::now(features, target));
            inner.samples_since_update += 1;
            inner.refresh();
            inner.config.auto_update && inner.should_update()
        };

        if !auto_update {
            return Ok(false);
        }
        match self.update_model() {
            Ok(report) => Ok(report.is_some()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Automatic online update failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Enabled, enough buffered samples, enough new samples since the last
    /// update, and the update interval has elapsed
    pub fn should_update(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.refresh();
        inner.should_update()
    }

    /// Run one incremental update on the most recent samples
    ///
    /// Returns `Ok(None)` when another update is already in flight.
    pub fn update_model(&self) -> Result<Option<UpdateReport>> {
        let (buffer, config, rate) = {
            let mut inner = self.inner.lock();
            match inner.state {
                ControllerState::Disabled => return Err(EnsembleError::OnlineLearningDisabled),
                ControllerState::Updating => return Ok(None),
                _ => {}
            }
            let buffer = inner
                .buffer
                .clone()
                .ok_or(EnsembleError::OnlineLearningDisabled)?;
            inner.state = ControllerState::Updating;
            (buffer, inner.config.clone(), inner.current_rate)
        };

        let result = self.apply_update(&buffer, &config, rate);

        let mut inner = self.inner.lock();
        let AppliedUpdate {
            samples_used,
            score,
            previous,
            version,
        } = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                inner.samples_since_update = 0;
                inner.state = if inner.buffer.is_some() {
                    ControllerState::Armed
                } else {
                    ControllerState::Disabled
                };
                return Err(e);
            }
        };

        inner.last_update = Some(Instant::now());
        inner.last_update_at = Some(Utc::now());
        inner.samples_since_update = 0;
        inner.update_count += 1;

        let previous_score = inner.history.back().map(|r| r.score);
        inner.history.push_back(PerformanceRecord {
            timestamp: Utc::now(),
            score,
            learning_rate: rate,
            model_version: version,
        });
        while inner.history.len() > config.max_history {
            inner.history.pop_front();
        }

        let drift = previous_score
            .map(|prev| prev - score > config.drift_threshold)
            .unwrap_or(false);
        inner.drift_detected = drift;

        let mut rolled_back = false;
        if drift {
            warn!(
                "Performance drift: score {:.3} -> {:.3} after update {}",
                previous_score.unwrap_or(score),
                score,
                inner.update_count
            );
            if config.rollback_on_drift {
                rolled_back = self.ensemble.restore_if_current(previous, version);
                if rolled_back {
                    info!("Rolled back to table v{}", self.ensemble.version());
                }
            }
        }

        inner.current_rate = scheduled_rate(&config, Some(score));
        inner.state = inner.state_after_update();

        let report = UpdateReport {
            samples_used,
            learning_rate: rate,
            score,
            drift_detected: drift,
            rolled_back,
            model_version: self.ensemble.version(),
        };
        info!(
            "Online update #{}: {} samples, rate {:.4}, score {:.3}",
            inner.update_count, samples_used, rate, score
        );
        Ok(Some(report))
    }

    fn apply_update(
        &self,
        buffer: &OnlineLearningBuffer,
        config: &OnlineLearningConfig,
        rate: f64,
    ) -> Result<AppliedUpdate> {
        if !self.ensemble.is_trained() {
            return Err(EnsembleError::NotTrained(
                "online update needs a trained ensemble".to_string(),
            ));
        }
        let samples = buffer.get_samples(config.min_samples_for_update);
        if samples.is_empty() {
            return Err(EnsembleError::EmptyData("online buffer is empty".to_string()));
        }
        let batch = TrainingDataset::from_samples(&samples, self.ensemble.feature_names())?;
        debug!("Online batch of {} samples", batch.n_samples());

        let previous = self.ensemble.update_incremental(
            &batch,
            rate,
            config.forget_factor,
            &CancellationToken::new(),
        )?;

        let score = score_samples(&self.ensemble, &buffer.get_samples(config.evaluation_window))?;
        Ok(AppliedUpdate {
            samples_used: batch.n_samples(),
            score,
            version: previous.version() + 1,
            previous,
        })
    }

    /// Directional accuracy of the ensemble on the buffer tail
    pub fn evaluate_recent(&self) -> Result<f64> {
        let buffer = self.buffer()?;
        let window = self.inner.lock().config.evaluation_window;
        score_samples(&self.ensemble, &buffer.get_samples(window))
    }

    pub fn current_learning_rate(&self) -> f64 {
        self.inner.lock().current_rate
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_update_at
    }

    pub fn performance_history(&self) -> Vec<PerformanceRecord> {
        self.inner.lock().history.iter().cloned().collect()
    }

    pub fn stats(&self) -> OnlineLearningStats {
        let mut inner = self.inner.lock();
        inner.refresh();
        let (buffer_size, buffer_capacity) = inner
            .buffer
            .as_ref()
            .map(|b| (b.len(), b.capacity()))
            .unwrap_or((0, 0));

        OnlineLearningStats {
            enabled: inner.is_enabled(),
            state: inner.state,
            buffer_size,
            buffer_capacity,
            last_update: inner.last_update_at,
            performance_history: inner.history.iter().map(|r| r.score).collect(),
            current_learning_rate: inner.current_rate,
            drift_detected: inner.drift_detected,
            update_count: inner.update_count,
            samples_since_update: inner.samples_since_update,
            model_version: self.ensemble.version(),
        }
    }
}

fn score_samples(ensemble: &Ensemble, samples: &[Sample]) -> Result<f64> {
    if samples.is_empty() {
        return Err(EnsembleError::EmptyData("no samples to score".to_string()));
    }
    let mut actual = Vec::with_capacity(samples.len());
    let mut predicted = Vec::with_capacity(samples.len());
    for sample in samples {
        predicted.push(ensemble.predict(&sample.features)?);
        actual.push(sample.target);
    }
    Ok(directional_accuracy(&actual, &predicted, DIRECTION_DEADBAND))
}
