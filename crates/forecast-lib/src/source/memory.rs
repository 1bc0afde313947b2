//! In-memory data source
//!
//! Holds catalog and order data in plain collections. Failure switches let
//! callers simulate an unreachable store or a failing sub-query.

use super::SalesDataSource;
use crate::error::SourceError;
use crate::models::{Customer, DateRange, OrderLine, Product, RevenueStats};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct MemorySource {
    order_lines: Vec<OrderLine>,
    products: HashMap<i64, Product>,
    categories: BTreeSet<i64>,
    suppliers: BTreeSet<i64>,
    customers: HashMap<String, Customer>,
    unreachable: AtomicBool,
    fail_revenue_stats: AtomicBool,
    fail_customer_lookup: AtomicBool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product, its category and its supplier
    pub fn with_product(mut self, product: Product) -> Self {
        if let Some(c) = product.category_id {
            self.categories.insert(c);
        }
        if let Some(s) = product.supplier_id {
            self.suppliers.insert(s);
        }
        self.products.insert(product.product_id, product);
        self
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.categories.insert(category_id);
        self
    }

    pub fn with_supplier(mut self, supplier_id: i64) -> Self {
        self.suppliers.insert(supplier_id);
        self
    }

    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customers.insert(customer.customer_id.clone(), customer);
        self
    }

    pub fn with_order_lines(mut self, lines: impl IntoIterator<Item = OrderLine>) -> Self {
        self.order_lines.extend(lines);
        self
    }

    /// Make every call fail as if the store were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_fail_revenue_stats(&self, fail: bool) {
        self.fail_revenue_stats.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_customer_lookup(&self, fail: bool) {
        self.fail_customer_lookup.store(fail, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), SourceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("memory source switched off".to_string()));
        }
        Ok(())
    }
}

impl SalesDataSource for MemorySource {
    fn fetch_order_lines(&self, range: Option<DateRange>) -> Result<Vec<OrderLine>, SourceError> {
        self.check_reachable()?;
        Ok(self
            .order_lines
            .iter()
            .filter(|line| match (&range, &line.order_date) {
                (Some(r), Some(d)) => r.contains(d),
                _ => true,
            })
            .cloned()
            .collect())
    }

    fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, SourceError> {
        self.check_reachable()?;
        Ok(self.products.get(&product_id).cloned())
    }

    fn fetch_categories(&self) -> Result<BTreeSet<i64>, SourceError> {
        self.check_reachable()?;
        Ok(self.categories.clone())
    }

    fn fetch_suppliers(&self) -> Result<BTreeSet<i64>, SourceError> {
        self.check_reachable()?;
        Ok(self.suppliers.clone())
    }

    fn fetch_customer(&self, customer_id: &str) -> Result<Option<Customer>, SourceError> {
        self.check_reachable()?;
        if self.fail_customer_lookup.load(Ordering::SeqCst) {
            return Err(SourceError::Query("customer lookup failed".to_string()));
        }
        Ok(self.customers.get(customer_id).cloned())
    }

    fn fetch_recent_revenue_stats(
        &self,
        product_id: i64,
        limit: usize,
    ) -> Result<Option<RevenueStats>, SourceError> {
        self.check_reachable()?;
        if self.fail_revenue_stats.load(Ordering::SeqCst) {
            return Err(SourceError::Query("revenue stats query failed".to_string()));
        }

        let mut lines: Vec<&OrderLine> = self
            .order_lines
            .iter()
            .filter(|l| l.product_id == Some(product_id))
            .collect();
        lines.sort_by(|a, b| b.order_date.cmp(&a.order_date));

        let recent: Vec<(f64, f64)> = lines
            .into_iter()
            .take(limit)
            .filter_map(|l| {
                let q = l.quantity?;
                let p = l.unit_price?;
                let d = l.discount.unwrap_or(0.0);
                Some((q, q * p * (1.0 - d)))
            })
            .collect();

        if recent.is_empty() {
            return Ok(None);
        }
        let n = recent.len() as f64;
        Ok(Some(RevenueStats {
            avg_quantity: recent.iter().map(|(q, _)| q).sum::<f64>() / n,
            avg_revenue: recent.iter().map(|(_, r)| r).sum::<f64>() / n,
        }))
    }
}
