//! Feed-forward neural network regressor

use super::ridge::{to_matrix, Standardizer};
use super::{check_row, check_training_input, BaseLearner};
use crate::error::{EnsembleError, Result};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Neural network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralNetConfig {
    /// Hidden layer width
    pub hidden_size: usize,
    /// Passes over the training data
    pub epochs: usize,
    /// SGD step size
    pub learning_rate: f64,
    /// Mini-batch size
    pub batch_size: usize,
    /// Seed for weight init and shuffling
    pub seed: u64,
}

impl Default for NeuralNetConfig {
    fn default() -> Self {
        Self {
            hidden_size: 16,
            epochs: 150,
            learning_rate: 0.05,
            batch_size: 16,
            seed: 42,
        }
    }
}

impl NeuralNetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hidden_size == 0 || self.epochs == 0 || self.batch_size == 0 {
            return Err(EnsembleError::Configuration(
                "neural network hidden_size, epochs and batch_size must be positive".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(EnsembleError::Configuration(format!(
                "neural network learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Layers {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array1<f64>,
    b2: f64,
}

impl Layers {
    fn init(n_inputs: usize, hidden: usize, rng: &mut ChaCha8Rng) -> Self {
        let limit = (6.0 / (n_inputs + hidden) as f64).sqrt();
        Self {
            w1: Array2::from_shape_fn((hidden, n_inputs), |_| rng.gen_range(-limit..limit)),
            b1: Array1::zeros(hidden),
            w2: Array1::from_shape_fn(hidden, |_| rng.gen_range(-limit..limit)),
            b2: 0.0,
        }
    }

    fn hidden(&self, x: &Array1<f64>) -> Array1<f64> {
        (self.w1.dot(x) + &self.b1).mapv(f64::tanh)
    }

    fn forward(&self, x: &Array1<f64>) -> f64 {
        self.w2.dot(&self.hidden(x)) + self.b2
    }
}

/// One-hidden-layer tanh network trained with mini-batch SGD on MSE
///
/// Inputs and targets are standardized internally; predictions are mapped
/// back to the target scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralNetwork {
    config: NeuralNetConfig,
    scaler: Option<Standardizer>,
    target_mean: f64,
    target_std: f64,
    layers: Option<Layers>,
}

impl NeuralNetwork {
    pub fn new(config: NeuralNetConfig) -> Self {
        Self {
            config,
            scaler: None,
            target_mean: 0.0,
            target_std: 1.0,
            layers: None,
        }
    }

    fn sgd_step(layers: &mut Layers, batch: &[(Array1<f64>, f64)], lr: f64) {
        let hidden = layers.b1.len();
        let n_inputs = layers.w1.ncols();
        let mut grad_w1 = Array2::<f64>::zeros((hidden, n_inputs));
        let mut grad_b1 = Array1::<f64>::zeros(hidden);
        let mut grad_w2 = Array1::<f64>::zeros(hidden);
        let mut grad_b2 = 0.0;

        for (x, y) in batch {
            let h = layers.hidden(x);
            let out = layers.w2.dot(&h) + layers.b2;
            let err = out - y;

            grad_w2 = grad_w2 + &h * err;
            grad_b2 += err;

            // d/dz tanh(z) = 1 - tanh(z)^2
            let delta = (&layers.w2 * err) * h.mapv(|a| 1.0 - a * a);
            for i in 0..hidden {
                for j in 0..n_inputs {
                    grad_w1[[i, j]] += delta[i] * x[j];
                }
            }
            grad_b1 = grad_b1 + &delta;
        }

        let scale = lr / batch.len() as f64;
        let clip = |g: f64| g.clamp(-1.0, 1.0);
        layers.w1.zip_mut_with(&grad_w1, |w, g| *w -= scale * clip(*g));
        layers.b1.zip_mut_with(&grad_b1, |b, g| *b -= scale * clip(*g));
        layers.w2.zip_mut_with(&grad_w2, |w, g| *w -= scale * clip(*g));
        layers.b2 -= scale * clip(grad_b2);
    }
}

impl BaseLearner for NeuralNetwork {
    fn train(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<()> {
        let n_features = check_training_input(self.name(), features, targets)?;

        let x = to_matrix(features);
        let scaler = Standardizer::fit(&x);
        let z = scaler.transform(&x);

        let n = targets.len() as f64;
        let target_mean = targets.iter().sum::<f64>() / n;
        let var = targets.iter().map(|t| (t - target_mean).powi(2)).sum::<f64>() / n;
        let target_std = if var.sqrt() > 1e-10 { var.sqrt() } else { 1.0 };

        let rows: Vec<(Array1<f64>, f64)> = z
            .outer_iter()
            .zip(targets.iter())
            .map(|(row, &t)| (row.to_owned(), (t - target_mean) / target_std))
            .collect();

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut layers = Layers::init(n_features, self.config.hidden_size, &mut rng);
        let mut order: Vec<usize> = (0..rows.len()).collect();

        for _ in 0..self.config.epochs {
            order.shuffle(&mut rng);
            for chunk in order.chunks(self.config.batch_size) {
                let batch: Vec<(Array1<f64>, f64)> =
                    chunk.iter().map(|&i| rows[i].clone()).collect();
                Self::sgd_step(&mut layers, &batch, self.config.learning_rate);
            }
        }

        if layers.w1.iter().chain(layers.w2.iter()).any(|w| !w.is_finite()) {
            return Err(EnsembleError::learner(self.name(), "training diverged"));
        }

        self.scaler = Some(scaler);
        self.target_mean = target_mean;
        self.target_std = target_std;
        self.layers = Some(layers);
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        let (scaler, layers) = match (&self.scaler, &self.layers) {
            (Some(s), Some(l)) => (s, l),
            _ => return Err(EnsembleError::NotTrained(self.name().to_string())),
        };
        check_row(scaler.dim(), features)?;
        let out = layers.forward(&scaler.transform_row(features));
        Ok(out * self.target_std + self.target_mean)
    }

    fn name(&self) -> &str {
        "neural_network"
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn feature_importance(&self) -> Vec<f64> {
        let Some(layers) = &self.layers else {
            return Vec::new();
        };
        let mut importance: Vec<f64> = layers
            .w1
            .columns()
            .into_iter()
            .map(|col| col.iter().map(|w| w.abs()).sum::<f64>() / col.len() as f64)
            .collect();
        crate::data::sampling::normalize(&mut importance);
        importance
    }
}
