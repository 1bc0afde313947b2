//! Data-access seam consumed by the pipeline
//!
//! The relational schema and its connection lifecycle live behind
//! [`SalesDataSource`]. Each call is an independent unit of work: a failure in
//! one lookup never leaves shared state that a later lookup depends on.

mod memory;
mod sqlite;

pub use memory::MemorySource;
pub use sqlite::SqliteSource;

use crate::error::SourceError;
use crate::models::{Customer, DateRange, OrderLine, Product, RevenueStats};
use std::collections::BTreeSet;

/// Read-only access to historical sales and catalog data
pub trait SalesDataSource: Send + Sync {
    /// Order lines joined with product, category and supplier context
    fn fetch_order_lines(&self, range: Option<DateRange>) -> Result<Vec<OrderLine>, SourceError>;

    fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, SourceError>;

    /// Every known category identifier, independent of sales history
    fn fetch_categories(&self) -> Result<BTreeSet<i64>, SourceError>;

    /// Every known supplier identifier, independent of sales history
    fn fetch_suppliers(&self) -> Result<BTreeSet<i64>, SourceError>;

    fn fetch_customer(&self, customer_id: &str) -> Result<Option<Customer>, SourceError>;

    /// Average quantity and revenue over the product's `limit` most recent
    /// order lines, `None` when the product has no history
    fn fetch_recent_revenue_stats(
        &self,
        product_id: i64,
        limit: usize,
    ) -> Result<Option<RevenueStats>, SourceError>;
}
