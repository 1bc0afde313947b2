//! Observability infrastructure for the forecast service
//!
//! Provides:
//! - Prometheus metrics (training duration, prediction latency, cleaning counts, model info)
//! - Structured event logging with tracing

use crate::extract::CleaningReport;
use crate::trainer::Metrics;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_gauge, GaugeVec, Histogram, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for prediction latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Histogram buckets for training runs (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ForecastMetricsInner> = OnceLock::new();

struct ForecastMetricsInner {
    training_duration_seconds: Histogram,
    prediction_latency_seconds: Histogram,
    trainings_completed: IntGauge,
    training_errors: IntGauge,
    predictions_served: IntGauge,
    prediction_errors: IntGauge,
    rows_cleaned: IntGauge,
    outliers_replaced: IntGauge,
    model_info: GaugeVec,
}

impl ForecastMetricsInner {
    fn new() -> Self {
        Self {
            training_duration_seconds: register_histogram!(
                "sales_forecast_training_duration_seconds",
                "Time spent extracting, fitting and persisting a model",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            prediction_latency_seconds: register_histogram!(
                "sales_forecast_prediction_latency_seconds",
                "Time spent building features and running inference",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            trainings_completed: register_int_gauge!(
                "sales_forecast_trainings_total",
                "Total number of successful training runs"
            )
            .expect("Failed to register trainings_total"),

            training_errors: register_int_gauge!(
                "sales_forecast_training_errors_total",
                "Total number of failed training runs"
            )
            .expect("Failed to register training_errors_total"),

            predictions_served: register_int_gauge!(
                "sales_forecast_predictions_total",
                "Total number of predictions served"
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_gauge!(
                "sales_forecast_prediction_errors_total",
                "Total number of failed predictions"
            )
            .expect("Failed to register prediction_errors_total"),

            rows_cleaned: register_int_gauge!(
                "sales_forecast_rows_cleaned",
                "Order lines cleaned by the most recent extraction"
            )
            .expect("Failed to register rows_cleaned"),

            outliers_replaced: register_int_gauge!(
                "sales_forecast_outliers_replaced",
                "Outliers replaced by the most recent extraction"
            )
            .expect("Failed to register outliers_replaced"),

            model_info: register_gauge_vec!(
                "sales_forecast_model_info",
                "Information about the currently active model",
                &["model_type", "trained_date"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Lightweight handle to the global forecast metrics.
///
/// Multiple clones share the same underlying collectors.
#[derive(Clone)]
pub struct ForecastMetrics {
    _private: (),
}

impl Default for ForecastMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ForecastMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ForecastMetricsInner {
        GLOBAL_METRICS.get_or_init(ForecastMetricsInner::new)
    }

    pub fn observe_training_duration(&self, duration_secs: f64) {
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_trainings_completed(&self) {
        self.inner().trainings_completed.inc();
    }

    pub fn inc_training_errors(&self) {
        self.inner().training_errors.inc();
    }

    pub fn inc_predictions_served(&self) {
        self.inner().predictions_served.inc();
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    pub fn record_cleaning(&self, report: &CleaningReport) {
        self.inner().rows_cleaned.set(report.rows as i64);
        self.inner()
            .outliers_replaced
            .set(report.total_outliers() as i64);
    }

    /// Replace the active-model label set
    pub fn set_model_info(&self, model_type: &str, trained_date: &str) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[model_type, trained_date])
            .set(1.0);
    }
}

/// Structured logger for forecast lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn log_cleaning_report(&self, report: &CleaningReport) {
        info!(
            event = "extraction_cleaned",
            service = %self.service_name,
            rows = report.rows,
            missing_filled = report.total_missing(),
            non_positive_replaced = report.non_positive_replaced.values().sum::<usize>(),
            outliers_replaced = report.total_outliers(),
            dates_pinned = report.dates_pinned,
            "Historical order lines cleaned"
        );
    }

    pub fn log_training_completed(&self, metrics: &Metrics, aggregates: usize, duration_secs: f64) {
        info!(
            event = "training_completed",
            service = %self.service_name,
            model_type = %metrics.model_type,
            aggregates = aggregates,
            r2_score = metrics.r2_score,
            rmse = metrics.rmse,
            mae = metrics.mae,
            accuracy = metrics.accuracy,
            duration_secs = duration_secs,
            "Model trained and persisted"
        );
    }

    pub fn log_training_failed(&self, model_type: &str, error: &dyn std::error::Error) {
        warn!(
            event = "training_failed",
            service = %self.service_name,
            model_type = %model_type,
            error = %error,
            "Training failed, keeping previous model"
        );
    }

    pub fn log_prediction(
        &self,
        product_id: i64,
        predicted_quantity: u64,
        confidence: f64,
        model_type: &str,
    ) {
        info!(
            event = "prediction_generated",
            service = %self.service_name,
            product_id = product_id,
            predicted_quantity = predicted_quantity,
            confidence = confidence,
            model_type = %model_type,
            "Generated sales forecast"
        );
    }

    pub fn log_model_loaded(&self, path: &str, model_type: &str, trained_date: &str) {
        info!(
            event = "model_loaded",
            service = %self.service_name,
            path = %path,
            model_type = %model_type,
            trained_date = %trained_date,
            "Model loaded from registry"
        );
    }

    pub fn log_model_unavailable(&self, path: &str, reason: &str) {
        warn!(
            event = "model_unavailable",
            service = %self.service_name,
            path = %path,
            reason = %reason,
            "No usable model artifact"
        );
    }
}
