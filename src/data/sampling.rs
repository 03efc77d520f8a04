//! Resampling and robust statistics helpers

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::cmp::Ordering;

/// Bootstrap sample: `size` indices drawn uniformly with replacement from `0..n`
pub fn bootstrap_indices<R: Rng>(n: usize, size: usize, rng: &mut R) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    (0..size).map(|_| rng.gen_range(0..n)).collect()
}

/// Draw `size` indices with probability proportional to `weights`
///
/// Falls back to uniform sampling when the weights are unusable
/// (all zero, negative or non-finite).
pub fn weighted_indices<R: Rng>(weights: &[f64], size: usize, rng: &mut R) -> Vec<usize> {
    match WeightedIndex::new(weights) {
        Ok(dist) => (0..size).map(|_| dist.sample(rng)).collect(),
        Err(_) => bootstrap_indices(weights.len(), size, rng),
    }
}

/// Median of a slice (0.0 for empty input)
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median absolute deviation around the median
pub fn median_absolute_deviation(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Arithmetic mean of the finite values, `None` if there are none
pub fn finite_mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        None
    } else {
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }
}

/// Normalize in place so the values sum to 1; no-op when the sum is not positive
pub fn normalize(values: &mut [f64]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}
