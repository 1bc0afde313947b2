//! Held-out evaluation metrics

use super::ModelType;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Evaluation of a fitted model on its held-out split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub r2_score: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Share of test predictions within `threshold` of the truth
    pub accuracy: f64,
    pub threshold: f64,
    /// Rows in the encoded table, train and test combined
    pub n_samples: usize,
    pub test_size: f64,
    pub model_type: ModelType,
}

/// Coefficient of determination; a constant truth scores 1.0 on an exact fit
/// and 0.0 otherwise
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn rmse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len().max(1) as f64;
    let mse: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n;
    mse.sqrt()
}

pub fn mae(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len().max(1) as f64;
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n
}

/// Threshold is `ratio` × mean |y_true|; returns (accuracy, threshold)
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>, ratio: f64) -> (f64, f64) {
    let n = y_true.len().max(1) as f64;
    let threshold = ratio * y_true.iter().map(|v| v.abs()).sum::<f64>() / n;
    let hits = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < threshold)
        .count();
    (hits as f64 / n, threshold)
}
