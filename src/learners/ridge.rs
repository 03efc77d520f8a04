//! Shared linear algebra for the ridge-based learners

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column z-score transform fitted on training data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Standardizer {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl Standardizer {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n_cols = x.ncols();
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_cols));
        let std = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-10 { s } else { 1.0 });
        Self { mean, std }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.std
    }

    pub fn transform_row(&self, row: &[f64]) -> Array1<f64> {
        (Array1::from_vec(row.to_vec()) - &self.mean) / &self.std
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

/// Build a row-major ndarray matrix from nested rows
pub(crate) fn to_matrix(rows: &[Vec<f64>]) -> Array2<f64> {
    let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
    Array2::from_shape_fn((rows.len(), n_cols), |(i, j)| rows[i][j])
}

/// Fitted ridge readout `y = w·x + b`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RidgeFit {
    pub weights: Array1<f64>,
    pub bias: f64,
}

impl RidgeFit {
    pub fn predict(&self, x: &Array1<f64>) -> f64 {
        self.weights.dot(x) + self.bias
    }
}

/// Ridge regression with an unpenalized intercept
///
/// Solves `(XcᵀXc + λI) w = Xcᵀyc` on centered data. Returns `None` when
/// the system is numerically singular.
pub(crate) fn fit_ridge(x: &Array2<f64>, y: &Array1<f64>, lambda: f64) -> Option<RidgeFit> {
    let n_cols = x.ncols();
    let x_mean = x.mean_axis(Axis(0))?;
    let y_mean = y.mean()?;

    let xc = x - &x_mean;
    let yc = y - y_mean;

    let mut gram = xc.t().dot(&xc);
    for i in 0..n_cols {
        gram[[i, i]] += lambda;
    }
    let rhs = xc.t().dot(&yc);

    let weights = solve(gram, rhs)?;
    let bias = y_mean - weights.dot(&x_mean);

    Some(RidgeFit { weights, bias })
}

/// Gaussian elimination with partial pivoting
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[[i, col]]
                .abs()
                .partial_cmp(&a[[j, col]].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }

    if x.iter().all(|v: &f64| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}
