//! Attention-based regressor
//!
//! Each feature becomes a token: a fixed value embedding scaled by the
//! feature plus a sinusoidal position code. One self-attention head with
//! seeded, frozen projections mixes the tokens; the mean-pooled output,
//! concatenated with the standardized inputs, goes through a ridge readout,
//! which is the only trained part.

use super::ridge::{fit_ridge, to_matrix, RidgeFit, Standardizer};
use super::{check_row, check_training_input, BaseLearner};
use crate::error::{EnsembleError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Transformer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    /// Token embedding width
    pub d_model: usize,
    /// Ridge penalty on the readout
    pub l2_reg: f64,
    /// Seed for the frozen embeddings and projections
    pub seed: u64,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            d_model: 16,
            l2_reg: 1e-2,
            seed: 42,
        }
    }
}

impl TransformerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.d_model < 2 {
            return Err(EnsembleError::Configuration(
                "transformer d_model must be at least 2".to_string(),
            ));
        }
        if !(self.l2_reg > 0.0 && self.l2_reg.is_finite()) {
            return Err(EnsembleError::Configuration(format!(
                "transformer l2_reg must be positive, got {}",
                self.l2_reg
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AttentionEncoder {
    value_embedding: Array1<f64>,
    w_q: Array2<f64>,
    w_k: Array2<f64>,
    w_v: Array2<f64>,
}

impl AttentionEncoder {
    fn new(d_model: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let scale = 1.0 / (d_model as f64).sqrt();
        let projection = |rng: &mut ChaCha8Rng| {
            Array2::from_shape_fn((d_model, d_model), |_| rng.gen_range(-scale..scale))
        };
        Self {
            value_embedding: Array1::from_shape_fn(d_model, |_| rng.gen_range(-1.0..1.0)),
            w_q: projection(&mut rng),
            w_k: projection(&mut rng),
            w_v: projection(&mut rng),
        }
    }

    fn d_model(&self) -> usize {
        self.value_embedding.len()
    }

    fn embed(&self, tokens: &Array1<f64>) -> Array2<f64> {
        let d = self.d_model();
        Array2::from_shape_fn((tokens.len(), d), |(pos, k)| {
            let angle = pos as f64 / 10_000f64.powf((2 * (k / 2)) as f64 / d as f64);
            let position = if k % 2 == 0 { angle.sin() } else { angle.cos() };
            tokens[pos] * self.value_embedding[k] + position
        })
    }

    /// Returns the pooled representation and the attention matrix
    fn encode(&self, tokens: &Array1<f64>) -> (Array1<f64>, Array2<f64>) {
        let e = self.embed(tokens);
        let q = e.dot(&self.w_q);
        let k = e.dot(&self.w_k);
        let v = e.dot(&self.w_v);

        let mut scores = q.dot(&k.t()) / (self.d_model() as f64).sqrt();
        for mut row in scores.outer_iter_mut() {
            let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            row.mapv_inplace(|s| (s - max).exp());
            let sum = row.sum();
            if sum > 0.0 && sum.is_finite() {
                row.mapv_inplace(|s| s / sum);
            }
        }

        let attended = scores.dot(&v) + &e;
        let pooled = attended
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.d_model()));
        (pooled, scores)
    }
}

/// Readout input: pooled attention output followed by the raw tokens
fn readout_input(pooled: &Array1<f64>, tokens: &Array1<f64>) -> Array1<f64> {
    pooled.iter().chain(tokens.iter()).copied().collect()
}

/// Single-head self-attention encoder with a trained linear readout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerRegressor {
    config: TransformerConfig,
    encoder: AttentionEncoder,
    scaler: Option<Standardizer>,
    readout: Option<RidgeFit>,
    attention_received: Vec<f64>,
}

impl TransformerRegressor {
    pub fn new(config: TransformerConfig) -> Self {
        let encoder = AttentionEncoder::new(config.d_model, config.seed);
        Self {
            config,
            encoder,
            scaler: None,
            readout: None,
            attention_received: Vec::new(),
        }
    }
}

impl BaseLearner for TransformerRegressor {
    fn train(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<()> {
        let n_features = check_training_input(self.name(), features, targets)?;

        let x = to_matrix(features);
        let scaler = Standardizer::fit(&x);
        let z = scaler.transform(&x);

        let d = self.config.d_model;
        let mut pooled = Array2::<f64>::zeros((features.len(), d + n_features));
        let mut received = Array1::<f64>::zeros(n_features);

        for (mut out, row) in pooled.outer_iter_mut().zip(z.outer_iter()) {
            let tokens = row.to_owned();
            let (rep, attention) = self.encoder.encode(&tokens);
            out.assign(&readout_input(&rep, &tokens));
            // Column means: how much attention each token receives
            if let Some(col_mean) = attention.mean_axis(Axis(0)) {
                received = received + col_mean;
            }
        }

        let y = Array1::from_vec(targets.to_vec());
        let readout = fit_ridge(&pooled, &y, self.config.l2_reg)
            .ok_or_else(|| EnsembleError::learner(self.name(), "singular readout system"))?;

        let mut importance = received.to_vec();
        crate::data::sampling::normalize(&mut importance);

        self.scaler = Some(scaler);
        self.readout = Some(readout);
        self.attention_received = importance;
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        let (scaler, readout) = match (&self.scaler, &self.readout) {
            (Some(s), Some(r)) => (s, r),
            _ => return Err(EnsembleError::NotTrained(self.name().to_string())),
        };
        check_row(scaler.dim(), features)?;
        let tokens = scaler.transform_row(features);
        let (rep, _) = self.encoder.encode(&tokens);
        Ok(readout.predict(&readout_input(&rep, &tokens)))
    }

    fn name(&self) -> &str {
        "transformer"
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn feature_importance(&self) -> Vec<f64> {
        self.attention_received.clone()
    }
}
