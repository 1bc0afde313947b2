//! Shared builders for unit tests

use crate::features::{CategoryDomain, FeatureVector};
use crate::models::{MonthlyAggregate, OrderLine, Product};
use crate::trainer::{ModelTrainer, ModelType, TrainedModel};
use chrono::{NaiveDate, NaiveDateTime};

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

pub(crate) fn product(
    product_id: i64,
    category_id: Option<i64>,
    supplier_id: Option<i64>,
    unit_price: Option<f64>,
) -> Product {
    Product {
        product_id,
        product_name: format!("Product {}", product_id),
        category_id,
        supplier_id,
        unit_price,
        discontinued: false,
    }
}

/// Two years of monthly aggregates for three products
pub(crate) fn aggregates() -> Vec<MonthlyAggregate> {
    (0..36)
        .map(|i| {
            let product = (i % 3) + 1;
            let price = 8.0 + product as f64;
            let quantity = 12.0 + (i % 7) as f64 * 2.0 + product as f64;
            MonthlyAggregate {
                product_id: product.to_string(),
                category_id: ((product % 2) + 1).to_string(),
                supplier_id: "1".to_string(),
                year: 2022 + i / 18,
                month: (i % 12) as u32 + 1,
                total_quantity: quantity,
                total_revenue: quantity * price,
                avg_price: price,
            }
        })
        .collect()
}

pub(crate) fn trained_model(model_type: ModelType) -> TrainedModel {
    let aggs = aggregates();
    ModelTrainer::default()
        .train(&aggs, model_type, &CategoryDomain::observed(&aggs))
        .unwrap()
}

/// A plausible request vector covering every column of the model's schema
pub(crate) fn feature_vector_for(model: &TrainedModel) -> FeatureVector {
    model
        .schema()
        .columns()
        .iter()
        .map(|c| {
            let value = match c.as_str() {
                "product_id" => 2.0,
                "year" => 2023.0,
                "month" => 6.0,
                "total_revenue" => 180.0,
                "avg_price" => 10.0,
                _ => 0.0,
            };
            (c.as_str(), value)
        })
        .collect()
}

/// Order lines for `months` consecutive months of three products
pub(crate) fn order_lines(months: u32) -> Vec<OrderLine> {
    let mut lines = Vec::new();
    for m in 0..months {
        let year = 2022 + (m / 12) as i32;
        let month = m % 12 + 1;
        for product in 1..=3i64 {
            for day in [3, 17] {
                lines.push(OrderLine {
                    product_id: Some(product),
                    category_id: Some((product % 2) + 1),
                    supplier_id: Some(1),
                    customer_id: Some("ALFKI".to_string()),
                    order_date: Some(date(year, month, day)),
                    quantity: Some(5.0 + product as f64 + (m % 4) as f64),
                    unit_price: Some(8.0 + product as f64),
                    discount: Some(0.05),
                });
            }
        }
    }
    lines
}
