//! Historical order-line extraction
//!
//! Pulls raw order lines from a [`SalesDataSource`], cleans every column and
//! derives revenue, year and month. An unreachable source is a hard failure,
//! never an empty result.

mod cleaning;

pub use cleaning::{min_valid_date, CleaningReport, UNKNOWN_CATEGORY};

use crate::error::ExtractionError;
use crate::models::{DateRange, OrderLine, SalesRow};
use crate::source::SalesDataSource;
use chrono::{Datelike, NaiveDateTime, Utc};
use tracing::{debug, error};

/// Cleaned rows together with what cleaning did to them
#[derive(Debug, Clone)]
pub struct Extraction {
    pub rows: Vec<SalesRow>,
    pub report: CleaningReport,
}

pub struct DataExtractor<'a> {
    source: &'a dyn SalesDataSource,
}

impl<'a> DataExtractor<'a> {
    pub fn new(source: &'a dyn SalesDataSource) -> Self {
        Self { source }
    }

    /// Extract and clean order lines, validating dates against the current time
    pub fn extract(&self, range: Option<DateRange>) -> Result<Extraction, ExtractionError> {
        self.extract_at(range, Utc::now().naive_utc())
    }

    /// Extract with an explicit clock for the upper bound of the date window
    pub fn extract_at(
        &self,
        range: Option<DateRange>,
        now: NaiveDateTime,
    ) -> Result<Extraction, ExtractionError> {
        let lines = self.source.fetch_order_lines(range).map_err(|e| {
            error!(error = %e, "Failed to fetch order lines");
            ExtractionError::SourceUnavailable(e)
        })?;
        debug!(lines = lines.len(), "Cleaning order lines");

        clean(&lines, now)
    }
}

/// Clean a batch of order lines into sales rows
pub fn clean(lines: &[OrderLine], now: NaiveDateTime) -> Result<Extraction, ExtractionError> {
    let mut report = CleaningReport {
        rows: lines.len(),
        ..Default::default()
    };
    if lines.is_empty() {
        return Ok(Extraction {
            rows: Vec::new(),
            report,
        });
    }

    let column = |f: fn(&OrderLine) -> Option<f64>| lines.iter().map(f).collect::<Vec<_>>();
    let quantity = cleaning::clean_numeric("quantity", &column(|l| l.quantity), &mut report)?;
    let unit_price = cleaning::clean_numeric("unit_price", &column(|l| l.unit_price), &mut report)?;
    let discount = cleaning::clean_numeric("discount", &column(|l| l.discount), &mut report)?;

    let id_column = |f: fn(&OrderLine) -> Option<i64>| {
        lines
            .iter()
            .map(|l| f(l).map(|v| v.to_string()))
            .collect::<Vec<_>>()
    };
    let product_id =
        cleaning::clean_categorical("product_id", &id_column(|l| l.product_id), &mut report);
    let category_id =
        cleaning::clean_categorical("category_id", &id_column(|l| l.category_id), &mut report);
    let supplier_id =
        cleaning::clean_categorical("supplier_id", &id_column(|l| l.supplier_id), &mut report);
    let customers: Vec<Option<String>> = lines.iter().map(|l| l.customer_id.clone()).collect();
    let customer_id = cleaning::clean_categorical("customer_id", &customers, &mut report);

    let dates: Vec<Option<NaiveDateTime>> = lines.iter().map(|l| l.order_date).collect();
    let order_date = cleaning::clean_dates(&dates, now, &mut report)?;

    let rows = (0..lines.len())
        .map(|i| SalesRow {
            product_id: product_id[i].clone(),
            category_id: category_id[i].clone(),
            supplier_id: supplier_id[i].clone(),
            customer_id: customer_id[i].clone(),
            order_date: order_date[i],
            year: order_date[i].year(),
            month: order_date[i].month(),
            quantity: quantity[i],
            unit_price: unit_price[i],
            discount: discount[i],
            revenue: quantity[i] * unit_price[i] * (1.0 - discount[i]),
        })
        .collect();

    Ok(Extraction { rows, report })
}
