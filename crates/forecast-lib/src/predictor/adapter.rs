//! Request-time feature construction and inference

use crate::error::PredictionError;
use crate::features::{indicator_name, FeatureSchema, FeatureVector, IndicatorKind};
use crate::models::Product;
use crate::source::SalesDataSource;
use crate::trainer::TrainedModel;
use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Number of buckets the customer country is hashed into
pub const COUNTRY_BUCKETS: u64 = 10;

/// Maps a model's r2 score to a reported confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidencePolicy {
    pub floor: f64,
    pub ceiling: f64,
    /// Used when r2 is not finite
    pub default: f64,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            floor: 0.5,
            ceiling: 0.95,
            default: 0.8,
        }
    }
}

impl ConfidencePolicy {
    pub fn confidence(&self, r2: f64) -> f64 {
        if !r2.is_finite() {
            return self.default.clamp(0.0, 1.0);
        }
        r2.max(self.floor).min(self.ceiling).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionConfig {
    /// Recent order lines averaged when no quantity is given
    pub history_window: usize,
    /// total_revenue = unit_price × this when the product has no history
    pub default_history_multiplier: f64,
    pub confidence: ConfidencePolicy,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            default_history_multiplier: 10.0,
            confidence: ConfidencePolicy::default(),
        }
    }
}

/// Output of a single inference
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub raw: f64,
    pub quantity: u64,
    pub confidence: f64,
}

/// Reorder `features` to `schema`: missing columns become 0, extras are dropped
pub fn reconcile(features: &FeatureVector, schema: &FeatureSchema) -> FeatureVector {
    schema
        .columns()
        .iter()
        .map(|column| (column.as_str(), features.get(column).unwrap_or(0.0)))
        .collect()
}

/// Stable bucket in `0..COUNTRY_BUCKETS` for a country name
pub fn country_bucket(country: &str) -> u64 {
    let digest = Sha256::digest(country.trim().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % COUNTRY_BUCKETS
}

/// Non-negative whole quantity; ties go to the even neighbour (2.5 -> 2)
pub fn round_quantity(raw: f64) -> u64 {
    raw.max(0.0).round_ties_even() as u64
}

#[derive(Debug, Clone, Default)]
pub struct PredictionAdapter {
    config: PredictionConfig,
}

impl PredictionAdapter {
    pub fn new(config: PredictionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Feature vector for one request.
    ///
    /// The revenue history lookup must succeed; the customer lookup may fail,
    /// in which case `customer_country` is left out.
    pub fn build_request_features(
        &self,
        source: &dyn SalesDataSource,
        product: &Product,
        order_date: NaiveDateTime,
        customer_id: Option<&str>,
        quantity: Option<f64>,
    ) -> Result<FeatureVector, PredictionError> {
        let unit_price = product.unit_price.filter(|p| p.is_finite()).ok_or_else(|| {
            PredictionError::FeaturePreparation(format!(
                "product {} has no unit price",
                product.product_id
            ))
        })?;

        let total_revenue = match quantity {
            Some(q) => unit_price * q,
            None => match source
                .fetch_recent_revenue_stats(product.product_id, self.config.history_window)
            {
                Ok(Some(stats)) => stats.avg_revenue,
                Ok(None) => unit_price * self.config.default_history_multiplier,
                Err(e) => {
                    return Err(PredictionError::FeaturePreparation(format!(
                        "revenue history for product {}: {}",
                        product.product_id, e
                    )))
                }
            },
        };

        let mut features = FeatureVector::new();
        features.set("product_id", product.product_id as f64);
        features.set("year", order_date.year() as f64);
        features.set("month", order_date.month() as f64);
        features.set("total_revenue", total_revenue);
        features.set("avg_price", unit_price);
        features.set("category_id", product.category_id.unwrap_or(0) as f64);
        features.set("supplier_id", product.supplier_id.unwrap_or(0) as f64);
        if let Some(id) = product.category_id {
            features.set(indicator_name(IndicatorKind::Category, &id.to_string()), 1.0);
        }
        if let Some(id) = product.supplier_id {
            features.set(indicator_name(IndicatorKind::Supplier, &id.to_string()), 1.0);
        }

        if let Some(customer_id) = customer_id {
            match source.fetch_customer(customer_id) {
                Ok(Some(customer)) => {
                    if let Some(country) = customer.country.as_deref() {
                        features.set("customer_country", country_bucket(country) as f64);
                    }
                }
                Ok(None) => debug!(customer_id = %customer_id, "Unknown customer, skipping enrichment"),
                Err(e) => warn!(
                    customer_id = %customer_id,
                    error = %e,
                    "Customer lookup failed, continuing without customer features"
                ),
            }
        }

        Ok(features)
    }

    /// Reconcile against the model's schema and run inference
    pub fn predict(
        &self,
        model: &TrainedModel,
        features: &FeatureVector,
    ) -> Result<Prediction, PredictionError> {
        let aligned = reconcile(features, model.schema());
        let raw = model.pipeline().predict_one(&aligned.values())?;
        Ok(Prediction {
            raw,
            quantity: round_quantity(raw),
            confidence: self.config.confidence.confidence(model.metrics().r2_score),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::fixtures;
    use crate::models::Customer;
    use crate::source::MemorySource;
    use chrono::NaiveDate;

    fn order_date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_reconcile_orders_pads_and_drops() {
        let schema = FeatureSchema::new(vec!["a".into(), "b".into(), "c".into()]);
        let features: FeatureVector = [("c", 3.0), ("extra", 9.0), ("a", 1.0)].into_iter().collect();
        let aligned = reconcile(&features, &schema);

        assert_eq!(aligned.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(aligned.values(), vec![1.0, 0.0, 3.0]);
        assert_eq!(reconcile(&aligned, &schema), aligned);
    }

    #[test]
    fn test_reconcile_empty_vector() {
        let schema = FeatureSchema::new(vec!["x".into(), "y".into()]);
        assert_eq!(reconcile(&FeatureVector::new(), &schema).values(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_confidence_policy() {
        let policy = ConfidencePolicy::default();
        assert_eq!(policy.confidence(0.2), 0.5);
        assert_eq!(policy.confidence(0.7), 0.7);
        assert_eq!(policy.confidence(0.99), 0.95);
        assert_eq!(policy.confidence(f64::NAN), 0.8);
        assert_eq!(policy.confidence(-3.0), 0.5);
    }

    #[test]
    fn test_country_bucket_is_stable() {
        let b = country_bucket("Germany");
        assert!(b < COUNTRY_BUCKETS);
        assert_eq!(b, country_bucket("Germany"));
    }

    #[test]
    fn test_features_with_quantity_skip_history() {
        let source = MemorySource::new();
        source.set_fail_revenue_stats(true);
        let product = fixtures::product(1, Some(3), Some(2), Some(10.0));
        let features = PredictionAdapter::default()
            .build_request_features(&source, &product, order_date(), None, Some(4.0))
            .unwrap();

        assert_eq!(features.get("total_revenue"), Some(40.0));
        assert_eq!(features.get("avg_price"), Some(10.0));
        assert_eq!(features.get("month"), Some(3.0));
        assert_eq!(features.get("category_3"), Some(1.0));
        assert_eq!(features.get("supplier_2"), Some(1.0));
    }

    #[test]
    fn test_history_default_and_failure() {
        let product = fixtures::product(1, Some(1), Some(1), Some(10.0));
        let source = MemorySource::new();
        let adapter = PredictionAdapter::default();

        let features = adapter
            .build_request_features(&source, &product, order_date(), None, None)
            .unwrap();
        assert_eq!(features.get("total_revenue"), Some(100.0));

        source.set_fail_revenue_stats(true);
        let err = adapter
            .build_request_features(&source, &product, order_date(), None, None)
            .unwrap_err();
        assert!(matches!(err, PredictionError::FeaturePreparation(_)));
    }

    #[test]
    fn test_customer_failure_degrades() {
        let product = fixtures::product(1, Some(1), Some(1), Some(10.0));
        let source = MemorySource::new().with_customer(Customer {
            customer_id: "ALFKI".to_string(),
            company_name: "Alfreds Futterkiste".to_string(),
            country: Some("Germany".to_string()),
        });
        let adapter = PredictionAdapter::default();

        let features = adapter
            .build_request_features(&source, &product, order_date(), Some("ALFKI"), Some(1.0))
            .unwrap();
        assert_eq!(features.get("customer_country"), Some(country_bucket("Germany") as f64));

        source.set_fail_customer_lookup(true);
        let features = adapter
            .build_request_features(&source, &product, order_date(), Some("ALFKI"), Some(1.0))
            .unwrap();
        assert_eq!(features.get("customer_country"), None);
    }

    #[test]
    fn test_missing_unit_price() {
        let product = fixtures::product(1, Some(1), Some(1), None);
        let err = PredictionAdapter::default()
            .build_request_features(&MemorySource::new(), &product, order_date(), None, Some(1.0))
            .unwrap_err();
        assert!(matches!(err, PredictionError::FeaturePreparation(_)));
    }

    #[test]
    fn test_predict_is_non_negative_integer() {
        let model = fixtures::trained_model(crate::trainer::ModelType::Linear);
        let adapter = PredictionAdapter::default();
        let mut features = FeatureVector::new();
        features.set("product_id", 1.0);
        features.set("total_revenue", -1.0e9);
        features.set("avg_price", 1.0);

        let prediction = adapter.predict(&model, &features).unwrap();
        assert_eq!(prediction.quantity, round_quantity(prediction.raw));
        assert!((0.5..=0.95).contains(&prediction.confidence));
    }

    #[test]
    fn test_round_quantity_ties_to_even() {
        assert_eq!(round_quantity(2.5), 2);
        assert_eq!(round_quantity(3.5), 4);
        assert_eq!(round_quantity(0.5), 0);
        assert_eq!(round_quantity(2.4999), 2);
        assert_eq!(round_quantity(2.5001), 3);
        assert_eq!(round_quantity(-1.5), 0);
    }

    #[test]
    fn test_non_finite_input_is_inference_error() {
        let model = fixtures::trained_model(crate::trainer::ModelType::Linear);
        let mut features = FeatureVector::new();
        features.set("total_revenue", f64::INFINITY);
        let err = PredictionAdapter::default()
            .predict(&model, &features)
            .unwrap_err();
        assert!(matches!(err, PredictionError::Inference(ModelError::NonFinite)));
    }
}
