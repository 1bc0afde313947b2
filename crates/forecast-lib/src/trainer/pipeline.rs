//! Standard scaling followed by a regressor

use super::knn::KnnRegressor;
use super::linear::{LinearRegression, LogisticParams, LogisticRegression};
use super::tree::{RegressionTree, TreeParams};
use super::ModelType;
use crate::error::ModelError;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Per-column standardisation with population statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Zero-variance columns keep a scale of 1.0
    pub fn fit(x: &Array2<f64>) -> Result<Self, ModelError> {
        let mean = x.mean_axis(Axis(0)).ok_or(ModelError::EmptyTrainingSet)?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean.view().insert_axis(Axis(0))) / &self.scale.view().insert_axis(Axis(0))
    }

    pub fn transform_row(&self, row: ArrayView1<f64>) -> Array1<f64> {
        (&row - &self.mean) / &self.scale
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Regressor {
    DecisionTree(RegressionTree),
    Linear(LinearRegression),
    Knn(KnnRegressor),
    Logistic(LogisticRegression),
}

impl Regressor {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            Regressor::DecisionTree(m) => m.predict_row(row),
            Regressor::Linear(m) => m.predict_row(row),
            Regressor::Knn(m) => m.predict_row(row),
            Regressor::Logistic(m) => m.predict_row(row),
        }
    }
}

/// Hyper-parameters for every supported regressor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressorParams {
    pub tree: TreeParams,
    pub knn_neighbors: usize,
    pub logistic: LogisticParams,
}

impl Default for RegressorParams {
    fn default() -> Self {
        Self {
            tree: TreeParams::default(),
            knn_neighbors: 5,
            logistic: LogisticParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    scaler: StandardScaler,
    regressor: Regressor,
}

impl FittedPipeline {
    pub fn fit(
        model_type: ModelType,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &RegressorParams,
    ) -> Result<Self, ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        let scaler = StandardScaler::fit(x)?;
        let scaled = scaler.transform(x);

        let regressor = match model_type {
            ModelType::DecisionTree => {
                Regressor::DecisionTree(RegressionTree::fit(&scaled, y, params.tree)?)
            }
            ModelType::Linear => Regressor::Linear(LinearRegression::fit(&scaled, y)?),
            ModelType::Knn => Regressor::Knn(KnnRegressor::fit(&scaled, y, params.knn_neighbors)?),
            ModelType::Logistic => {
                Regressor::Logistic(LogisticRegression::fit(&scaled, y, params.logistic)?)
            }
        };

        Ok(Self { scaler, regressor })
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        if x.ncols() != self.n_features() {
            return Err(ModelError::ShapeMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        let scaled = self.scaler.transform(x);
        Ok(scaled
            .rows()
            .into_iter()
            .map(|row| self.regressor.predict_row(row))
            .collect())
    }

    pub fn predict_one(&self, values: &[f64]) -> Result<f64, ModelError> {
        if values.len() != self.n_features() {
            return Err(ModelError::ShapeMismatch {
                expected: self.n_features(),
                actual: values.len(),
            });
        }
        let scaled = self.scaler.transform_row(ArrayView1::from(values));
        let prediction = self.regressor.predict_row(scaled.view());
        if !prediction.is_finite() {
            return Err(ModelError::NonFinite);
        }
        Ok(prediction)
    }

    /// Only decision trees report importances
    pub fn feature_importances(&self) -> Option<&[f64]> {
        match &self.regressor {
            Regressor::DecisionTree(tree) => Some(tree.feature_importances()),
            _ => None,
        }
    }

    pub fn regressor(&self) -> &Regressor {
        &self.regressor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_scaler_handles_constant_column() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let t = scaler.transform(&x);
        assert_eq!(t, array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_pipeline_shape_mismatch() {
        let x = array![[1.0, 2.0], [2.0, 3.0], [3.0, 5.0]];
        let y = array![1.0, 2.0, 3.0];
        let pipeline =
            FittedPipeline::fit(ModelType::Linear, &x, &y, &RegressorParams::default()).unwrap();
        assert_eq!(
            pipeline.predict_one(&[1.0]).unwrap_err(),
            ModelError::ShapeMismatch {
                expected: 2,
                actual: 1
            }
        );
        assert!(pipeline.feature_importances().is_none());
    }

    #[test]
    fn test_every_model_type_fits() {
        let x = Array2::from_shape_fn((20, 3), |(i, j)| (i * (j + 1)) as f64 % 7.0);
        let y = Array1::from_shape_fn(20, |i| (i % 5) as f64 + 1.0);
        for model_type in ModelType::ALL {
            let pipeline =
                FittedPipeline::fit(model_type, &x, &y, &RegressorParams::default()).unwrap();
            let preds = pipeline.predict(&x).unwrap();
            assert_eq!(preds.len(), 20);
            assert!(preds.iter().all(|p| p.is_finite()));
        }
    }
}
