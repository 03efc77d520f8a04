//! LSTM sequence regressor
//!
//! The feature vector is read as a sequence of scalars, one per time step.
//! Recurrent weights are drawn once from the seed and kept frozen; only the
//! linear readout over the final hidden state and the standardized inputs is
//! fitted (ridge, closed form).

use super::ridge::{fit_ridge, RidgeFit, Standardizer};
use super::{check_row, check_training_input, BaseLearner};
use crate::error::{EnsembleError, Result};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// LSTM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LstmConfig {
    /// Hidden state width
    pub hidden_size: usize,
    /// Ridge penalty on the readout
    pub l2_reg: f64,
    /// Seed for the frozen recurrent weights
    pub seed: u64,
}

impl Default for LstmConfig {
    fn default() -> Self {
        Self {
            hidden_size: 24,
            l2_reg: 1e-2,
            seed: 42,
        }
    }
}

impl LstmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hidden_size == 0 {
            return Err(EnsembleError::Configuration(
                "lstm hidden_size must be positive".to_string(),
            ));
        }
        if !(self.l2_reg > 0.0 && self.l2_reg.is_finite()) {
            return Err(EnsembleError::Configuration(format!(
                "lstm l2_reg must be positive, got {}",
                self.l2_reg
            )));
        }
        Ok(())
    }
}

/// Input, forget, output and candidate gate parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Gate {
    w: Array1<f64>,
    u: Array2<f64>,
    b: Array1<f64>,
}

impl Gate {
    fn random(hidden: usize, bias: f64, rng: &mut ChaCha8Rng) -> Self {
        let scale = 1.0 / (hidden as f64).sqrt();
        Self {
            w: Array1::from_shape_fn(hidden, |_| rng.gen_range(-1.0..1.0)),
            u: Array2::from_shape_fn((hidden, hidden), |_| rng.gen_range(-scale..scale)),
            b: Array1::from_elem(hidden, bias),
        }
    }

    fn pre_activation(&self, x: f64, h: &Array1<f64>) -> Array1<f64> {
        &self.w * x + self.u.dot(h) + &self.b
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LstmCell {
    input: Gate,
    forget: Gate,
    output: Gate,
    candidate: Gate,
}

impl LstmCell {
    fn new(hidden: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self {
            input: Gate::random(hidden, 0.0, &mut rng),
            // Forget bias of 1 keeps early steps in memory
            forget: Gate::random(hidden, 1.0, &mut rng),
            output: Gate::random(hidden, 0.0, &mut rng),
            candidate: Gate::random(hidden, 0.0, &mut rng),
        }
    }

    /// Final hidden state after consuming the sequence
    fn encode(&self, sequence: &Array1<f64>) -> Array1<f64> {
        let hidden = self.input.b.len();
        let mut h = Array1::<f64>::zeros(hidden);
        let mut c = Array1::<f64>::zeros(hidden);

        for &x in sequence.iter() {
            let i = self.input.pre_activation(x, &h).mapv(sigmoid);
            let f = self.forget.pre_activation(x, &h).mapv(sigmoid);
            let o = self.output.pre_activation(x, &h).mapv(sigmoid);
            let g = self.candidate.pre_activation(x, &h).mapv(f64::tanh);

            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f64::tanh);
        }
        h
    }
}

/// Readout input: final hidden state followed by the raw sequence
fn readout_input(state: &Array1<f64>, sequence: &Array1<f64>) -> Array1<f64> {
    state.iter().chain(sequence.iter()).copied().collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// LSTM encoder over the feature sequence with a trained linear readout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmRegressor {
    config: LstmConfig,
    cell: LstmCell,
    scaler: Option<Standardizer>,
    readout: Option<RidgeFit>,
}

impl LstmRegressor {
    pub fn new(config: LstmConfig) -> Self {
        let cell = LstmCell::new(config.hidden_size, config.seed);
        Self {
            config,
            cell,
            scaler: None,
            readout: None,
        }
    }
}

impl BaseLearner for LstmRegressor {
    fn train(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<()> {
        let n_features = check_training_input(self.name(), features, targets)?;

        let x = super::ridge::to_matrix(features);
        let scaler = Standardizer::fit(&x);
        let z = scaler.transform(&x);

        let hidden = self.config.hidden_size;
        let mut states = Array2::<f64>::zeros((features.len(), hidden + n_features));
        for (mut state, row) in states.outer_iter_mut().zip(z.outer_iter()) {
            let sequence = row.to_owned();
            state.assign(&readout_input(&self.cell.encode(&sequence), &sequence));
        }

        let y = Array1::from_vec(targets.to_vec());
        let readout = fit_ridge(&states, &y, self.config.l2_reg)
            .ok_or_else(|| EnsembleError::learner(self.name(), "singular readout system"))?;

        self.scaler = Some(scaler);
        self.readout = Some(readout);
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        let (scaler, readout) = match (&self.scaler, &self.readout) {
            (Some(s), Some(r)) => (s, r),
            _ => return Err(EnsembleError::NotTrained(self.name().to_string())),
        };
        check_row(scaler.dim(), features)?;
        let sequence = scaler.transform_row(features);
        let state = self.cell.encode(&sequence);
        Ok(readout.predict(&readout_input(&state, &sequence)))
    }

    fn name(&self) -> &str {
        "lstm"
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn feature_importance(&self) -> Vec<f64> {
        Vec::new()
    }
}
