//! Regression metrics for evaluating the ensemble

use serde::{Deserialize, Serialize};

/// Values inside `(-DIRECTION_DEADBAND, DIRECTION_DEADBAND)` count as flat
pub const DIRECTION_DEADBAND: f64 = 0.5;

/// Regression metrics over one evaluation set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// R-squared (coefficient of determination)
    pub r2: f64,
    /// Share of rows whose thresholded direction matches
    pub directional_accuracy: f64,
    /// Number of samples
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Calculate all metrics; empty input yields zeros
    pub fn calculate(y_true: &[f64], y_pred: &[f64]) -> Self {
        let n = y_true.len().min(y_pred.len());
        if n == 0 {
            return Self {
                mse: 0.0,
                rmse: 0.0,
                mae: 0.0,
                r2: 0.0,
                directional_accuracy: 0.0,
                n_samples: 0,
            };
        }
        let (y_true, y_pred) = (&y_true[..n], &y_pred[..n]);

        let mse = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).powi(2))
            .sum::<f64>()
            / n as f64;
        let mae = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).abs())
            .sum::<f64>()
            / n as f64;

        Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2: r_squared(y_true, y_pred),
            directional_accuracy: directional_accuracy(y_true, y_pred, DIRECTION_DEADBAND),
            n_samples: n,
        }
    }
}

/// R² = 1 - SS_res / SS_tot (0.0 for constant targets)
pub fn r_squared(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot < 1e-10 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

/// -1, 0 or 1 with a symmetric deadband around zero
pub fn thresholded_sign(value: f64, deadband: f64) -> i8 {
    if value > deadband {
        1
    } else if value < -deadband {
        -1
    } else {
        0
    }
}

/// Fraction of rows where the thresholded signs agree
pub fn directional_accuracy(y_true: &[f64], y_pred: &[f64], deadband: f64) -> f64 {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return 0.0;
    }
    let hits = y_true
        .iter()
        .zip(y_pred)
        .filter(|(t, p)| thresholded_sign(**t, deadband) == thresholded_sign(**p, deadband))
        .count();
    hits as f64 / n as f64
}
