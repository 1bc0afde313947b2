//! K-nearest-neighbours regressor

use crate::error::ModelError;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnRegressor {
    k: usize,
    x_train: Array2<f64>,
    y_train: Array1<f64>,
}

impl KnnRegressor {
    /// Stores the training set; `k` is capped at its size
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, k: usize) -> Result<Self, ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if x.nrows() != y.len() {
            return Err(ModelError::ShapeMismatch {
                expected: x.nrows(),
                actual: y.len(),
            });
        }
        Ok(Self {
            k: k.clamp(1, x.nrows()),
            x_train: x.clone(),
            y_train: y.clone(),
        })
    }

    /// Uniform mean of the k nearest targets by Euclidean distance; ties go
    /// to the earlier training row
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut distances: Vec<(f64, usize)> = self
            .x_train
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, train)| {
                let d: f64 = train
                    .iter()
                    .zip(row.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                (d, i)
            })
            .collect();
        distances.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        let total: f64 = distances
            .iter()
            .take(self.k)
            .map(|(_, i)| self.y_train[*i])
            .sum();
        total / self.k as f64
    }

    pub fn k(&self) -> usize {
        self.k
    }
}
