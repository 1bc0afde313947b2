//! End-to-end flows over an in-memory source
//!
//! Each test wires a `ForecastService` to a `MemorySource` and a registry in
//! a temp directory, then drives training and prediction through the public
//! operations.

use super::*;
use crate::error::{ErrorKind, SourceError};
use crate::fixtures;
use crate::models::Customer;
use crate::source::MemorySource;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    source: Arc<MemorySource>,
    service: ForecastService,
}

fn catalog_source(months: u32) -> MemorySource {
    MemorySource::new()
        .with_product(fixtures::product(1, Some(2), Some(1), Some(9.0)))
        .with_product(fixtures::product(2, Some(1), Some(1), Some(10.0)))
        .with_product(fixtures::product(3, Some(2), Some(1), Some(11.0)))
        .with_product(fixtures::product(4, Some(9), Some(7), Some(12.0)))
        .with_product(fixtures::product(5, Some(1), Some(1), None))
        .with_category(5)
        .with_customer(Customer {
            customer_id: "ALFKI".to_string(),
            company_name: "Alfreds Futterkiste".to_string(),
            country: Some("Germany".to_string()),
        })
        .with_order_lines(fixtures::order_lines(months))
}

fn harness_with(source: MemorySource, config: ServiceConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(source);
    let registry = ModelRegistry::new(dir.path().join("models/sales_forecast_model.bin"));
    let service = ForecastService::new(source.clone(), registry, config);
    Harness {
        _dir: dir,
        source,
        service,
    }
}

fn harness(months: u32) -> Harness {
    harness_with(catalog_source(months), ServiceConfig::default())
}

fn request(product_id: i64) -> PredictionRequest {
    PredictionRequest {
        product_id,
        order_date: fixtures::date(2024, 2, 10),
        customer_id: None,
        quantity: None,
    }
}

#[test]
fn test_train_then_predict() {
    let h = harness(12);
    assert!(!h.service.is_ready());

    let metrics = h.service.train("decision_tree").unwrap();
    assert_eq!(metrics.model_type, ModelType::DecisionTree);
    assert_eq!(metrics.n_samples, 36);
    assert!(h.service.is_ready());
    assert!(h.service.registry().exists());

    let result = h.service.predict(&request(2)).unwrap();
    assert_eq!(result.product_id, 2);
    assert_eq!(result.product_name, "Product 2");
    assert!((0.5..=0.95).contains(&result.confidence));
}

#[test]
fn test_every_model_type_trains_and_serves() {
    let h = harness(12);
    for model_type in ModelType::ALL {
        let metrics = h.service.train(model_type.as_str()).unwrap();
        assert_eq!(metrics.model_type, model_type);

        let result = h.service.predict(&request(1)).unwrap();
        assert!((0.5..=0.95).contains(&result.confidence));
        assert_eq!(h.service.model_info().unwrap().model_type, model_type);
    }
}

#[test]
fn test_catalog_domain_covers_unsold_category() {
    let h = harness(12);
    h.service.train("decision_tree").unwrap();

    let info = h.service.model_info().unwrap();
    let schema = &info.feature_schema;
    assert_eq!(
        &schema[..5],
        &["product_id", "year", "month", "total_revenue", "avg_price"]
    );
    assert!(schema.contains(&"category_5".to_string()));
    assert!(schema.contains(&"category_9".to_string()));
    assert!(schema.contains(&"supplier_7".to_string()));
    assert!(info.feature_importance.is_some());
}

#[test]
fn test_observed_domain_excludes_catalog_only_ids() {
    let config = ServiceConfig {
        features: FeatureConfig {
            domain_policy: DomainPolicy::Observed,
        },
        ..Default::default()
    };
    let h = harness_with(catalog_source(12), config);
    h.service.train("linear").unwrap();

    let schema = h.service.model_info().unwrap().feature_schema;
    assert_eq!(
        schema,
        vec![
            "product_id",
            "year",
            "month",
            "total_revenue",
            "avg_price",
            "category_1",
            "category_2",
            "supplier_1"
        ]
    );
}

#[test]
fn test_unseen_category_still_predicts() {
    let config = ServiceConfig {
        features: FeatureConfig {
            domain_policy: DomainPolicy::Observed,
        },
        ..Default::default()
    };
    let source = catalog_source(12).with_customer(Customer {
        customer_id: "BLAUS".to_string(),
        company_name: "Blauer See".to_string(),
        country: Some("Atlantis".to_string()),
    });
    let h = harness_with(source, config);
    h.service.train("knn").unwrap();

    // Product 4 sits in category 9 and supplier 7, neither seen in training
    let model = h.service.active_model().unwrap();
    let product = h.source.fetch_product(4).unwrap().unwrap();
    let features = h
        .service
        .adapter
        .build_request_features(
            h.source.as_ref(),
            &product,
            fixtures::date(2024, 2, 10),
            Some("BLAUS"),
            None,
        )
        .unwrap();
    assert_eq!(features.get("category_9"), Some(1.0));
    assert!(features.get("customer_country").is_some());

    let aligned = crate::predictor::reconcile(&features, model.schema());
    assert_eq!(aligned.len(), model.schema().len());
    let names: Vec<&str> = aligned.names().collect();
    assert_eq!(names, model.schema().columns().iter().map(String::as_str).collect::<Vec<_>>());
    for (name, value) in names.iter().zip(aligned.values()) {
        if name.starts_with("category_") || name.starts_with("supplier_") {
            assert_eq!(value, 0.0, "{} should be inactive", name);
        }
    }
    assert!(!names.contains(&"category_9"));
    assert!(!names.contains(&"customer_country"));

    let result = h
        .service
        .predict(&PredictionRequest {
            customer_id: Some("BLAUS".to_string()),
            ..request(4)
        })
        .unwrap();
    assert_eq!(result.product_id, 4);
}

#[test]
fn test_concurrent_retrains_leave_served_model_on_disk() {
    let h = Arc::new(harness(12));
    let threads: Vec<_> = ["decision_tree", "linear", "knn", "logistic"]
        .into_iter()
        .cycle()
        .take(8)
        .map(|model_type| {
            let h = h.clone();
            std::thread::spawn(move || h.service.train(model_type).map(|_| ()))
        })
        .collect();
    for thread in threads {
        thread.join().unwrap().unwrap();
    }

    let served = h.service.active_model().unwrap();
    let on_disk = h.service.registry().load().unwrap();
    assert_eq!(on_disk, *served);

    let leftovers = std::fs::read_dir(h.service.registry().path().parent().unwrap())
        .unwrap()
        .count();
    assert_eq!(leftovers, 1);
}

#[test]
fn test_bogus_model_type_reads_nothing_and_keeps_model() {
    let h = harness(12);
    h.service.train("linear").unwrap();
    let before = h.service.model_info().unwrap();

    h.source.set_unreachable(true);
    let err = h.service.train("random_forest").unwrap_err();
    assert!(matches!(err, TrainingError::UnknownModelType(ref t) if t == "random_forest"));
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    assert_eq!(h.service.model_info().unwrap(), before);
}

#[test]
fn test_insufficient_data_keeps_previous_model() {
    let h = harness(3);
    let err = h.service.train("decision_tree").unwrap_err();
    assert!(matches!(
        err,
        TrainingError::InsufficientData { rows: 9, required: 10 }
    ));
    assert!(!h.service.is_ready());
    assert!(!h.service.registry().exists());
}

#[test]
fn test_unreachable_source_fails_training() {
    let h = harness(12);
    h.source.set_unreachable(true);
    let err = h.service.train("decision_tree").unwrap_err();
    assert!(matches!(
        err,
        TrainingError::Extraction(ExtractionError::SourceUnavailable(SourceError::Unavailable(_)))
    ));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn test_predict_without_model() {
    let h = harness(12);
    let err = h.service.predict(&request(1)).unwrap_err();
    assert!(matches!(err, PredictionError::ModelNotTrained));
    assert_eq!(err.kind(), ErrorKind::NotTrained);
    assert!(matches!(
        h.service.model_info(),
        Err(PredictionError::ModelNotTrained)
    ));
}

#[test]
fn test_unknown_product() {
    let h = harness(12);
    h.service.train("decision_tree").unwrap();
    let err = h.service.predict(&request(404)).unwrap_err();
    assert!(matches!(err, PredictionError::ProductNotFound(404)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_history_failure_propagates() {
    let h = harness(12);
    h.service.train("decision_tree").unwrap();
    h.source.set_fail_revenue_stats(true);

    let err = h.service.predict(&request(1)).unwrap_err();
    assert!(matches!(err, PredictionError::FeaturePreparation(_)));
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let with_quantity = PredictionRequest {
        quantity: Some(6.0),
        ..request(1)
    };
    assert!(h.service.predict(&with_quantity).is_ok());
}

#[test]
fn test_customer_failure_degrades_gracefully() {
    let h = harness(12);
    h.service.train("decision_tree").unwrap();
    h.source.set_fail_customer_lookup(true);

    let with_customer = PredictionRequest {
        customer_id: Some("ALFKI".to_string()),
        ..request(1)
    };
    assert!(h.service.predict(&with_customer).is_ok());
}

#[test]
fn test_product_without_price_is_bad_request() {
    let h = harness(12);
    h.service.train("decision_tree").unwrap();
    let err = h.service.predict(&request(5)).unwrap_err();
    assert!(matches!(err, PredictionError::FeaturePreparation(_)));
}

#[test]
fn test_source_down_after_training_is_internal() {
    let h = harness(12);
    h.service.train("decision_tree").unwrap();
    h.source.set_unreachable(true);
    let err = h.service.predict(&request(1)).unwrap_err();
    assert!(matches!(err, PredictionError::Source(_)));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn test_restart_loads_persisted_model() {
    let h = harness(12);
    let metrics = h.service.train("knn").unwrap();

    let restarted = ForecastService::new(
        h.source.clone(),
        h.service.registry().clone(),
        ServiceConfig::default(),
    );
    assert!(!restarted.is_ready());
    assert!(restarted.load_model().unwrap());
    assert!(restarted.is_ready());
    assert_eq!(restarted.model_info().unwrap().metrics, metrics);
}

#[test]
fn test_lazy_load_on_first_prediction() {
    let h = harness(12);
    h.service.train("decision_tree").unwrap();

    let restarted = ForecastService::new(
        h.source.clone(),
        h.service.registry().clone(),
        ServiceConfig::default(),
    );
    assert!(restarted.predict(&request(3)).is_ok());
    assert!(restarted.is_ready());
}

#[test]
fn test_corrupt_artifact_is_not_trained() {
    let h = harness(12);
    h.service.train("decision_tree").unwrap();
    std::fs::write(h.service.registry().path(), b"garbage").unwrap();

    let restarted = ForecastService::new(
        h.source.clone(),
        h.service.registry().clone(),
        ServiceConfig::default(),
    );
    assert!(matches!(
        restarted.load_model(),
        Err(RegistryError::Corrupt { .. })
    ));
    assert!(matches!(
        restarted.predict(&request(1)),
        Err(PredictionError::ModelNotTrained)
    ));
}

#[test]
fn test_load_model_without_artifact() {
    let h = harness(12);
    assert!(!h.service.load_model().unwrap());
    assert!(!h.service.is_ready());
}
