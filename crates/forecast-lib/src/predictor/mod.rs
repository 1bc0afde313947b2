//! Prediction engine

mod adapter;
mod handle;

pub use adapter::{
    country_bucket, reconcile, ConfidencePolicy, Prediction, PredictionAdapter, PredictionConfig,
    COUNTRY_BUCKETS,
};
pub use handle::ModelHandle;

use crate::error::PredictionError;
use crate::features::FeatureVector;
use crate::trainer::TrainedModel;

/// Trait for prediction implementations
pub trait Predictor: Send + Sync {
    /// Scalar forecast for an already-built feature vector
    fn predict(&self, model: &TrainedModel, features: &FeatureVector)
        -> Result<Prediction, PredictionError>;
}

impl Predictor for PredictionAdapter {
    fn predict(
        &self,
        model: &TrainedModel,
        features: &FeatureVector,
    ) -> Result<Prediction, PredictionError> {
        PredictionAdapter::predict(self, model, features)
    }
}
