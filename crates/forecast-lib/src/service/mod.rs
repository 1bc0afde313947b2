//! Forecast service facade
//!
//! Wires the extractor, feature builder, trainer, registry and prediction
//! adapter together behind the operations the binary exposes.

use crate::error::{ExtractionError, PredictionError, RegistryError, TrainingError};
use crate::extract::DataExtractor;
use crate::features::{CategoryDomain, DomainPolicy, FeatureBuilder, FeatureConfig};
use crate::models::{PredictionRequest, PredictionResult};
use crate::observability::{ForecastMetrics, StructuredLogger};
use crate::predictor::{ModelHandle, PredictionAdapter, PredictionConfig};
use crate::registry::ModelRegistry;
use crate::source::SalesDataSource;
use crate::trainer::{Metrics, ModelTrainer, ModelType, TrainedModel, TrainingConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    pub training: TrainingConfig,
    pub features: FeatureConfig,
    pub prediction: PredictionConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "sales-forecast".to_string(),
            training: TrainingConfig::default(),
            features: FeatureConfig::default(),
            prediction: PredictionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Description of the active model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_type: ModelType,
    pub trained_date: DateTime<Utc>,
    pub metrics: Metrics,
    pub feature_schema: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<Vec<FeatureImportance>>,
}

impl ModelInfo {
    fn from_model(model: &TrainedModel) -> Self {
        Self {
            model_type: model.model_type(),
            trained_date: model.trained_date(),
            metrics: model.metrics().clone(),
            feature_schema: model.schema().columns().to_vec(),
            feature_importance: model.feature_importance().map(|pairs| {
                pairs
                    .into_iter()
                    .map(|(feature, importance)| FeatureImportance {
                        feature,
                        importance,
                    })
                    .collect()
            }),
        }
    }
}

pub struct ForecastService {
    source: Arc<dyn SalesDataSource>,
    registry: ModelRegistry,
    handle: ModelHandle,
    builder: FeatureBuilder,
    trainer: ModelTrainer,
    adapter: PredictionAdapter,
    metrics: ForecastMetrics,
    logger: StructuredLogger,
    /// Held for a whole training run so persist and swap stay paired
    train_lock: Mutex<()>,
}

impl ForecastService {
    pub fn new(
        source: Arc<dyn SalesDataSource>,
        registry: ModelRegistry,
        config: ServiceConfig,
    ) -> Self {
        Self {
            source,
            registry,
            handle: ModelHandle::new(),
            builder: FeatureBuilder::new(config.features),
            trainer: ModelTrainer::new(config.training),
            adapter: PredictionAdapter::new(config.prediction),
            metrics: ForecastMetrics::new(),
            logger: StructuredLogger::new(config.service_name),
            train_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Extract, fit, persist, then swap the new model in.
    ///
    /// An unknown model type is rejected before any data is read, and the
    /// active model only changes once the artifact is on disk. Concurrent
    /// calls run one after another, so the last artifact written is always
    /// the model being served.
    pub fn train(&self, model_type: &str) -> Result<Metrics, TrainingError> {
        let model_type: ModelType = model_type.parse()?;
        // A panicked run leaves nothing half-applied, so the guard is reusable
        let _guard = self
            .train_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let started = Instant::now();

        let result = self.train_inner(model_type);
        match &result {
            Ok((metrics, aggregates)) => {
                let elapsed = started.elapsed().as_secs_f64();
                self.metrics.observe_training_duration(elapsed);
                self.metrics.inc_trainings_completed();
                self.logger
                    .log_training_completed(metrics, *aggregates, elapsed);
            }
            Err(e) => {
                self.metrics.inc_training_errors();
                self.logger.log_training_failed(model_type.as_str(), e);
            }
        }
        result.map(|(metrics, _)| metrics)
    }

    fn train_inner(&self, model_type: ModelType) -> Result<(Metrics, usize), TrainingError> {
        let extraction = DataExtractor::new(self.source.as_ref()).extract(None)?;
        self.metrics.record_cleaning(&extraction.report);
        self.logger.log_cleaning_report(&extraction.report);

        let mut aggregates = self.builder.aggregate(&extraction.rows);
        if self.trainer.config().clamp_aggregate_outliers {
            let replaced = self.builder.clamp_outliers(&mut aggregates);
            debug!(replaced, "Clamped aggregate outliers");
        }

        let catalog = match self.builder.config().domain_policy {
            DomainPolicy::Catalog => Some(self.catalog_domain()?),
            DomainPolicy::Observed => None,
        };
        let domain = self.builder.domain(&aggregates, catalog.as_ref());

        let model = self.trainer.train(&aggregates, model_type, &domain)?;
        self.registry.save(&model).map_err(TrainingError::Persist)?;

        let metrics = model.metrics().clone();
        self.metrics
            .set_model_info(model.model_type().as_str(), &model.trained_date().to_rfc3339());
        self.handle.replace(model);
        Ok((metrics, aggregates.len()))
    }

    fn catalog_domain(&self) -> Result<CategoryDomain, TrainingError> {
        let unavailable = |e| TrainingError::Extraction(ExtractionError::SourceUnavailable(e));
        let categories = self.source.fetch_categories().map_err(unavailable)?;
        let suppliers = self.source.fetch_suppliers().map_err(unavailable)?;
        Ok(CategoryDomain::from_catalog(&categories, &suppliers))
    }

    /// Forecast the quantity for one request
    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult, PredictionError> {
        let started = Instant::now();
        let result = self.predict_inner(request);
        match &result {
            Ok(_) => {
                self.metrics
                    .observe_prediction_latency(started.elapsed().as_secs_f64());
                self.metrics.inc_predictions_served();
            }
            Err(_) => self.metrics.inc_prediction_errors(),
        }
        result.map(|(prediction, model_type)| {
            self.logger.log_prediction(
                prediction.product_id,
                prediction.predicted_quantity,
                prediction.confidence,
                model_type.as_str(),
            );
            prediction
        })
    }

    fn predict_inner(
        &self,
        request: &PredictionRequest,
    ) -> Result<(PredictionResult, ModelType), PredictionError> {
        let model = self.active_model()?;

        let product = self
            .source
            .fetch_product(request.product_id)
            .map_err(PredictionError::Source)?
            .ok_or(PredictionError::ProductNotFound(request.product_id))?;

        let features = self.adapter.build_request_features(
            self.source.as_ref(),
            &product,
            request.order_date,
            request.customer_id.as_deref(),
            request.quantity,
        )?;
        let prediction = self.adapter.predict(&model, &features)?;

        Ok((
            PredictionResult {
                product_id: product.product_id,
                product_name: product.product_name,
                predicted_quantity: prediction.quantity,
                confidence: prediction.confidence,
                timestamp: Utc::now(),
            },
            model.model_type(),
        ))
    }

    /// Active model, loading it from the registry when nothing is in memory
    fn active_model(&self) -> Result<Arc<TrainedModel>, PredictionError> {
        self.handle.get_or_load(&self.registry).map_err(|e| {
            if !matches!(e, RegistryError::NotFound(_)) {
                self.logger
                    .log_model_unavailable(&self.registry.path().display().to_string(), &e.to_string());
            }
            PredictionError::ModelNotTrained
        })
    }

    pub fn model_info(&self) -> Result<ModelInfo, PredictionError> {
        let model = self.active_model()?;
        Ok(ModelInfo::from_model(&model))
    }

    /// Warm the handle from the registry; `Ok(false)` when nothing is saved yet
    pub fn load_model(&self) -> Result<bool, RegistryError> {
        match self.registry.load() {
            Ok(model) => {
                self.logger.log_model_loaded(
                    &self.registry.path().display().to_string(),
                    model.model_type().as_str(),
                    &model.trained_date().to_rfc3339(),
                );
                self.metrics
                    .set_model_info(model.model_type().as_str(), &model.trained_date().to_rfc3339());
                self.handle.replace(model);
                Ok(true)
            }
            Err(RegistryError::NotFound(_)) => Ok(false),
            Err(e) => {
                self.logger
                    .log_model_unavailable(&self.registry.path().display().to_string(), &e.to_string());
                Err(e)
            }
        }
    }

    /// True once a model is serving
    pub fn is_ready(&self) -> bool {
        self.handle.is_loaded()
    }
}
