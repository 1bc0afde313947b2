//! Forecast configuration

use anyhow::{Context, Result};
use forecast_lib::features::{DomainPolicy, FeatureConfig};
use forecast_lib::predictor::{ConfidencePolicy, PredictionConfig};
use forecast_lib::trainer::{RegressorParams, TrainingConfig};
use forecast_lib::ServiceConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Forecast configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    /// SQLite database holding the order history
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Where the trained model artifact lives
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Fraction of rows held out for evaluation
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    /// Fewer aggregated rows than this refuses to train
    #[serde(default = "default_min_training_rows")]
    pub min_training_rows: usize,

    #[serde(default = "default_knn_neighbors")]
    pub knn_neighbors: usize,

    /// Tolerance for the accuracy metric, as a fraction of mean |y|
    #[serde(default = "default_accuracy_threshold_ratio")]
    pub accuracy_threshold_ratio: f64,

    #[serde(default = "default_true")]
    pub clamp_aggregate_outliers: bool,

    /// Indicator universe: `catalog` or `observed`
    #[serde(default)]
    pub domain_policy: DomainPolicy,

    /// Recent order lines averaged when a request has no quantity
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Revenue estimate multiplier when a product has no history
    #[serde(default = "default_history_multiplier")]
    pub default_history_multiplier: f64,

    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,

    #[serde(default = "default_confidence_ceiling")]
    pub confidence_ceiling: f64,

    /// Confidence reported when r2 is not finite
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("northwind.db")
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/sales_forecast_model.bin")
}

fn default_api_port() -> u16 {
    8080
}

fn default_service_name() -> String {
    "sales-forecast".to_string()
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_seed() -> u64 {
    42
}

fn default_min_training_rows() -> usize {
    10
}

fn default_knn_neighbors() -> usize {
    5
}

fn default_accuracy_threshold_ratio() -> f64 {
    0.2
}

fn default_true() -> bool {
    true
}

fn default_history_window() -> usize {
    10
}

fn default_history_multiplier() -> f64 {
    10.0
}

fn default_confidence_floor() -> f64 {
    0.5
}

fn default_confidence_ceiling() -> f64 {
    0.95
}

fn default_confidence() -> f64 {
    0.8
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            model_path: default_model_path(),
            api_port: default_api_port(),
            service_name: default_service_name(),
            test_size: default_test_size(),
            random_seed: default_random_seed(),
            min_training_rows: default_min_training_rows(),
            knn_neighbors: default_knn_neighbors(),
            accuracy_threshold_ratio: default_accuracy_threshold_ratio(),
            clamp_aggregate_outliers: default_true(),
            domain_policy: DomainPolicy::default(),
            history_window: default_history_window(),
            default_history_multiplier: default_history_multiplier(),
            confidence_floor: default_confidence_floor(),
            confidence_ceiling: default_confidence_ceiling(),
            default_confidence: default_confidence(),
        }
    }
}

impl ForecastConfig {
    /// Load configuration from an optional file, then `FORECAST_*` environment variables
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        builder = match file {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("forecast").required(false)),
        };
        let config = builder
            .add_source(config::Environment::with_prefix("FORECAST"))
            .build()
            .context("Failed to read forecast configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid forecast configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            anyhow::bail!("test_size must be in (0, 1), got {}", self.test_size);
        }
        if self.knn_neighbors == 0 {
            anyhow::bail!("knn_neighbors must be at least 1");
        }
        if self.confidence_floor > self.confidence_ceiling {
            anyhow::bail!(
                "confidence_floor {} exceeds confidence_ceiling {}",
                self.confidence_floor,
                self.confidence_ceiling
            );
        }
        Ok(())
    }

    pub fn training(&self) -> TrainingConfig {
        TrainingConfig {
            test_size: self.test_size,
            random_seed: self.random_seed,
            min_rows: self.min_training_rows,
            accuracy_threshold_ratio: self.accuracy_threshold_ratio,
            clamp_aggregate_outliers: self.clamp_aggregate_outliers,
            regressor: RegressorParams {
                knn_neighbors: self.knn_neighbors,
                ..RegressorParams::default()
            },
        }
    }

    pub fn features(&self) -> FeatureConfig {
        FeatureConfig {
            domain_policy: self.domain_policy,
        }
    }

    pub fn prediction(&self) -> PredictionConfig {
        PredictionConfig {
            history_window: self.history_window,
            default_history_multiplier: self.default_history_multiplier,
            confidence: ConfidencePolicy {
                floor: self.confidence_floor,
                ceiling: self.confidence_ceiling,
                default: self.default_confidence,
            },
        }
    }

    pub fn service(&self) -> ServiceConfig {
        ServiceConfig {
            service_name: self.service_name.clone(),
            training: self.training(),
            features: self.features(),
            prediction: self.prediction(),
        }
    }
}
