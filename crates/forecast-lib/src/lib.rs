//! Sales forecast library
//!
//! This crate provides the core functionality for:
//! - Extracting and cleaning historical order lines
//! - Building monthly per-product feature tables
//! - Training and evaluating regression models
//! - Persisting models and serving predictions
//! - Metrics and structured logging

pub mod error;
pub mod extract;
pub mod features;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod registry;
pub mod service;
pub mod source;
pub mod stats;
pub mod trainer;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::{
    ErrorKind, ExtractionError, FeatureError, ModelError, PredictionError, RegistryError,
    SourceError, TrainingError,
};
pub use models::*;
pub use observability::{ForecastMetrics, StructuredLogger};
pub use registry::ModelRegistry;
pub use service::{FeatureImportance, ForecastService, ModelInfo, ServiceConfig};
pub use source::{MemorySource, SalesDataSource, SqliteSource};
pub use trainer::{Metrics, ModelType, TrainedModel};
