//! Linear and multinomial logistic models

use crate::error::ModelError;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Relative ridge added to the normal equations on each retry
const RIDGE_STEPS: [f64; 4] = [1e-10, 1e-8, 1e-5, 1e-2];

/// Solve A·x = b for symmetric positive-definite A; `None` if not PD
fn cholesky(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Ordinary least squares with intercept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearRegression {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>) -> Result<Self, ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if x.nrows() != y.len() {
            return Err(ModelError::ShapeMismatch {
                expected: x.nrows(),
                actual: y.len(),
            });
        }

        let x_mean = x.mean_axis(Axis(0)).ok_or(ModelError::EmptyTrainingSet)?;
        let y_mean = y.mean().ok_or(ModelError::EmptyTrainingSet)?;
        let xc = x - &x_mean.view().insert_axis(Axis(0));
        let yc = y - y_mean;

        let xtx = xc.t().dot(&xc);
        let xty = xc.t().dot(&yc);
        let n = xtx.nrows();
        let scale = (xtx.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64).max(1.0);

        let coefficients = RIDGE_STEPS
            .iter()
            .find_map(|step| {
                let mut reg = xtx.clone();
                for k in 0..n {
                    reg[[k, k]] += step * scale;
                }
                cholesky(&reg, &xty)
            })
            .ok_or(ModelError::Singular)?;

        let intercept = y_mean - coefficients.dot(&x_mean);
        Ok(Self {
            coefficients,
            intercept,
        })
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        row.dot(&self.coefficients) + self.intercept
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    pub max_iter: usize,
    pub learning_rate: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            max_iter: 100,
            learning_rate: 0.5,
        }
    }
}

/// Multinomial logistic regression over integer-valued targets.
///
/// Every distinct rounded target value is a class; prediction returns the
/// value of the most probable class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    classes: Vec<f64>,
    weights: Array2<f64>,
    bias: Array1<f64>,
}

fn softmax_rows(logits: &mut Array2<f64>) {
    for mut row in logits.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        }
    }
}

impl LogisticRegression {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: LogisticParams) -> Result<Self, ModelError> {
        let n = x.nrows();
        if n == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if n != y.len() {
            return Err(ModelError::ShapeMismatch {
                expected: n,
                actual: y.len(),
            });
        }

        let mut classes: Vec<f64> = y.iter().map(|v| v.round()).collect();
        classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        classes.dedup();
        let k = classes.len();
        let f = x.ncols();

        let mut onehot = Array2::<f64>::zeros((n, k));
        for (i, v) in y.iter().enumerate() {
            if let Ok(c) = classes.binary_search_by(|candidate| {
                candidate
                    .partial_cmp(&v.round())
                    .unwrap_or(std::cmp::Ordering::Equal)
            }) {
                onehot[[i, c]] = 1.0;
            }
        }

        let mut weights = Array2::<f64>::zeros((f, k));
        let mut bias = Array1::<f64>::zeros(k);
        if k > 1 {
            let penalty = 1.0 / n as f64;
            for _ in 0..params.max_iter {
                let mut probs = x.dot(&weights) + &bias.view().insert_axis(Axis(0));
                softmax_rows(&mut probs);
                let residual = probs - &onehot;

                let grad_w = x.t().dot(&residual) / n as f64 + &weights * penalty;
                let grad_b = residual.sum_axis(Axis(0)) / n as f64;
                weights.scaled_add(-params.learning_rate, &grad_w);
                bias.scaled_add(-params.learning_rate, &grad_b);
            }
        }

        Ok(Self {
            classes,
            weights,
            bias,
        })
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let logits = row.dot(&self.weights) + &self.bias;
        let best = logits
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
                if v > bv {
                    (i, v)
                } else {
                    (bi, bv)
                }
            })
            .0;
        self.classes.get(best).copied().unwrap_or(f64::NAN)
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }
}
