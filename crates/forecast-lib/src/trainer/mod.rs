//! Model training and evaluation
//!
//! Encodes monthly aggregates, splits them with a seeded shuffle, fits a
//! scaler + regressor pipeline and scores it on the held-out rows. Persisting
//! the result is the caller's job.

mod knn;
mod linear;
mod metrics;
mod pipeline;
mod tree;

pub use knn::KnnRegressor;
pub use linear::{LinearRegression, LogisticParams, LogisticRegression};
pub use metrics::{accuracy, mae, r2_score, rmse, Metrics};
pub use pipeline::{FittedPipeline, Regressor, RegressorParams, StandardScaler};
pub use tree::{RegressionTree, TreeNode, TreeParams};

use crate::error::TrainingError;
use crate::features::{self, CategoryDomain, FeatureSchema};
use crate::models::MonthlyAggregate;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    #[default]
    DecisionTree,
    Linear,
    Knn,
    Logistic,
}

impl ModelType {
    pub const ALL: [ModelType; 4] = [
        ModelType::DecisionTree,
        ModelType::Linear,
        ModelType::Knn,
        ModelType::Logistic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::DecisionTree => "decision_tree",
            ModelType::Linear => "linear",
            ModelType::Knn => "knn",
            ModelType::Logistic => "logistic",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| TrainingError::UnknownModelType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub test_size: f64,
    pub random_seed: u64,
    /// Fewest encoded rows a training run accepts
    pub min_rows: usize,
    pub accuracy_threshold_ratio: f64,
    pub clamp_aggregate_outliers: bool,
    pub regressor: RegressorParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_seed: 42,
            min_rows: 10,
            accuracy_threshold_ratio: 0.2,
            clamp_aggregate_outliers: true,
            regressor: RegressorParams::default(),
        }
    }
}

/// A fitted pipeline with the schema it was trained on
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pipeline: FittedPipeline,
    schema: FeatureSchema,
    metrics: Metrics,
    model_type: ModelType,
    trained_date: DateTime<Utc>,
}

impl TrainedModel {
    pub(crate) fn from_parts(
        pipeline: FittedPipeline,
        schema: FeatureSchema,
        metrics: Metrics,
        model_type: ModelType,
        trained_date: DateTime<Utc>,
    ) -> Self {
        Self {
            pipeline,
            schema,
            metrics,
            model_type,
            trained_date,
        }
    }

    pub fn pipeline(&self) -> &FittedPipeline {
        &self.pipeline
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn trained_date(&self) -> DateTime<Utc> {
        self.trained_date
    }

    /// Feature importances by column name, most important first
    pub fn feature_importance(&self) -> Option<Vec<(String, f64)>> {
        let importances = self.pipeline.feature_importances()?;
        let mut named: Vec<(String, f64)> = self
            .schema
            .columns()
            .iter()
            .cloned()
            .zip(importances.iter().copied())
            .collect();
        named.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Some(named)
    }
}

/// Seeded train/test split; returns (train, test) row indices
pub fn split_indices(n: usize, test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * test_size).ceil() as usize).clamp(1, n.saturating_sub(1).max(1));
    let train = indices.split_off(n_test.min(n));
    (train, indices)
}

pub struct ModelTrainer {
    config: TrainingConfig,
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Encode, split, fit and evaluate
    pub fn train(
        &self,
        aggregates: &[MonthlyAggregate],
        model_type: ModelType,
        domain: &CategoryDomain,
    ) -> Result<TrainedModel, TrainingError> {
        let (table, schema) = features::encode(aggregates, domain)?;
        let n = table.n_rows();
        let required = self.config.min_rows.max(2);
        if n < required {
            return Err(TrainingError::InsufficientData { rows: n, required });
        }

        let (train_idx, test_idx) =
            split_indices(n, self.config.test_size, self.config.random_seed);
        let x_train = table.features.select(Axis(0), &train_idx);
        let y_train = table.target.select(Axis(0), &train_idx);
        let x_test = table.features.select(Axis(0), &test_idx);
        let y_test = table.target.select(Axis(0), &test_idx);
        debug!(
            train_rows = train_idx.len(),
            test_rows = test_idx.len(),
            features = schema.len(),
            model_type = %model_type,
            "Fitting pipeline"
        );

        let pipeline = FittedPipeline::fit(model_type, &x_train, &y_train, &self.config.regressor)?;
        let metrics = self.evaluate(&pipeline, &x_test, &y_test, n, model_type)?;
        info!(
            model_type = %model_type,
            r2_score = metrics.r2_score,
            rmse = metrics.rmse,
            n_samples = n,
            "Model fitted"
        );

        Ok(TrainedModel::from_parts(
            pipeline,
            schema,
            metrics,
            model_type,
            Utc::now(),
        ))
    }

    fn evaluate(
        &self,
        pipeline: &FittedPipeline,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
        n_samples: usize,
        model_type: ModelType,
    ) -> Result<Metrics, TrainingError> {
        let y_pred = pipeline.predict(x_test)?;
        let (accuracy, threshold) =
            metrics::accuracy(y_test, &y_pred, self.config.accuracy_threshold_ratio);
        Ok(Metrics {
            r2_score: metrics::r2_score(y_test, &y_pred),
            rmse: metrics::rmse(y_test, &y_pred),
            mae: metrics::mae(y_test, &y_pred),
            accuracy,
            threshold,
            n_samples,
            test_size: self.config.test_size,
            model_type,
        })
    }
}
