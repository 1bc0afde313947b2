//! Core data models for the forecast pipeline

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One order line as fetched from the data source, before cleaning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Option<i64>,
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub customer_id: Option<String>,
    pub order_date: Option<NaiveDateTime>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub discount: Option<f64>,
}

/// A cleaned order line joined with its product context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRow {
    pub product_id: String,
    pub category_id: String,
    pub supplier_id: String,
    pub customer_id: String,
    pub order_date: NaiveDateTime,
    pub year: i32,
    pub month: u32,
    pub quantity: f64,
    pub unit_price: f64,
    pub discount: f64,
    /// quantity × unit_price × (1 − discount), computed after cleaning
    pub revenue: f64,
}

/// Monthly per-product sales aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAggregate {
    pub product_id: String,
    pub category_id: String,
    pub supplier_id: String,
    pub year: i32,
    pub month: u32,
    pub total_quantity: f64,
    pub total_revenue: f64,
    pub avg_price: f64,
}

/// Inclusive order-date window for extraction; either bound may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: &NaiveDateTime) -> bool {
        self.start.map_or(true, |s| *date >= s) && self.end.map_or(true, |e| *date <= e)
    }
}

/// Product catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: i64,
    pub product_name: String,
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub unit_price: Option<f64>,
    pub discontinued: bool,
}

/// Customer record, only the country is used for enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub company_name: String,
    pub country: Option<String>,
}

/// Averages over a product's most recent order lines
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RevenueStats {
    pub avg_quantity: f64,
    pub avg_revenue: f64,
}

/// A single forecast request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub product_id: i64,
    pub order_date: NaiveDateTime,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
}

/// Forecast returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub product_id: i64,
    pub product_name: String,
    pub predicted_quantity: u64,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}
