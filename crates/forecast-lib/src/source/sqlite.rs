//! SQLite-backed data source over a Northwind-style order schema
//!
//! Every call opens its own connection, so one failed lookup cannot poison
//! the state seen by the next.

use super::SalesDataSource;
use crate::error::SourceError;
use crate::models::{Customer, DateRange, OrderLine, Product, RevenueStats};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ORDER_LINES_QUERY: &str = "
    SELECT od.product_id, p.category_id, p.supplier_id, o.customer_id,
           o.order_date, od.quantity, od.unit_price, od.discount
    FROM order_details od
    JOIN products p ON od.product_id = p.product_id
    JOIN orders o ON od.order_id = o.order_id
    WHERE o.order_date IS NOT NULL";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS categories (
        category_id INTEGER PRIMARY KEY,
        category_name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS suppliers (
        supplier_id INTEGER PRIMARY KEY,
        company_name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS customers (
        customer_id TEXT PRIMARY KEY,
        company_name TEXT NOT NULL,
        country TEXT
    );
    CREATE TABLE IF NOT EXISTS products (
        product_id INTEGER PRIMARY KEY,
        product_name TEXT NOT NULL,
        supplier_id INTEGER REFERENCES suppliers(supplier_id),
        category_id INTEGER REFERENCES categories(category_id),
        unit_price REAL,
        discontinued INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS orders (
        order_id INTEGER PRIMARY KEY,
        customer_id TEXT REFERENCES customers(customer_id),
        order_date TEXT
    );
    CREATE TABLE IF NOT EXISTS order_details (
        order_id INTEGER NOT NULL REFERENCES orders(order_id),
        product_id INTEGER NOT NULL REFERENCES products(product_id),
        unit_price REAL,
        quantity REAL,
        discount REAL,
        PRIMARY KEY (order_id, product_id)
    );";

#[derive(Debug, Clone)]
pub struct SqliteSource {
    path: PathBuf,
}

impl SqliteSource {
    /// Point at an existing database; the file is opened lazily per call
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create the database file and its tables if they are missing
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a connection without creating the file
    fn connect(&self) -> Result<Connection, SourceError> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SourceError::Unavailable(format!("{}: {}", self.path.display(), e)))
    }
}

/// Parse a stored order date; unparseable text becomes `None` and is pinned
/// later by cleaning
fn parse_order_date(raw: Option<String>) -> Option<NaiveDateTime> {
    let raw = raw?;
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl SalesDataSource for SqliteSource {
    fn fetch_order_lines(&self, range: Option<DateRange>) -> Result<Vec<OrderLine>, SourceError> {
        let conn = self.connect()?;

        let mut sql = ORDER_LINES_QUERY.to_string();
        let mut bounds: Vec<String> = Vec::new();
        if let Some(range) = range {
            if let Some(start) = range.start {
                sql.push_str(" AND o.order_date >= ?");
                bounds.push(start.format(DATE_FORMAT).to_string());
            }
            if let Some(end) = range.end {
                sql.push_str(" AND o.order_date <= ?");
                bounds.push(end.format(DATE_FORMAT).to_string());
            }
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bounds.iter()), |row| {
            Ok(OrderLine {
                product_id: row.get(0)?,
                category_id: row.get(1)?,
                supplier_id: row.get(2)?,
                customer_id: row.get(3)?,
                order_date: parse_order_date(row.get(4)?),
                quantity: row.get(5)?,
                unit_price: row.get(6)?,
                discount: row.get(7)?,
            })
        })?;

        let lines = rows.collect::<Result<Vec<_>, _>>()?;
        debug!(rows = lines.len(), path = %self.path.display(), "Fetched order lines");
        Ok(lines)
    }

    fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, SourceError> {
        let conn = self.connect()?;
        let product = conn
            .query_row(
                "SELECT product_id, product_name, category_id, supplier_id, unit_price, discontinued
                 FROM products WHERE product_id = ?1",
                params![product_id],
                |row| {
                    Ok(Product {
                        product_id: row.get(0)?,
                        product_name: row.get(1)?,
                        category_id: row.get(2)?,
                        supplier_id: row.get(3)?,
                        unit_price: row.get(4)?,
                        discontinued: row.get::<_, Option<i64>>(5)?.unwrap_or(0) != 0,
                    })
                },
            )
            .optional()?;
        Ok(product)
    }

    fn fetch_categories(&self) -> Result<BTreeSet<i64>, SourceError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT category_id FROM categories")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    fn fetch_suppliers(&self) -> Result<BTreeSet<i64>, SourceError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT supplier_id FROM suppliers")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    fn fetch_customer(&self, customer_id: &str) -> Result<Option<Customer>, SourceError> {
        let conn = self.connect()?;
        let customer = conn
            .query_row(
                "SELECT customer_id, company_name, country FROM customers WHERE customer_id = ?1",
                params![customer_id],
                |row| {
                    Ok(Customer {
                        customer_id: row.get(0)?,
                        company_name: row.get(1)?,
                        country: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(customer)
    }

    fn fetch_recent_revenue_stats(
        &self,
        product_id: i64,
        limit: usize,
    ) -> Result<Option<RevenueStats>, SourceError> {
        let conn = self.connect()?;
        let (avg_quantity, avg_revenue): (Option<f64>, Option<f64>) = conn.query_row(
            "SELECT AVG(quantity), AVG(quantity * unit_price * (1 - discount))
             FROM (
                 SELECT od.quantity, od.unit_price, od.discount
                 FROM order_details od
                 JOIN orders o ON od.order_id = o.order_id
                 WHERE od.product_id = ?1
                 ORDER BY o.order_date DESC
                 LIMIT ?2
             )",
            params![product_id, limit as i64],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(match (avg_quantity, avg_revenue) {
            (Some(avg_quantity), Some(avg_revenue)) => Some(RevenueStats {
                avg_quantity,
                avg_revenue,
            }),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded_source(dir: &TempDir) -> SqliteSource {
        let path = dir.path().join("northwind.db");
        let source = SqliteSource::create(&path).unwrap();
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "INSERT INTO categories VALUES (1, 'Beverages'), (2, 'Condiments');
             INSERT INTO suppliers VALUES (1, 'Exotic Liquids');
             INSERT INTO customers VALUES ('ALFKI', 'Alfreds Futterkiste', 'Germany');
             INSERT INTO products VALUES (1, 'Chai', 1, 1, 18.0, 0), (2, 'Aniseed Syrup', 1, 2, 10.0, 0);
             INSERT INTO orders VALUES (10248, 'ALFKI', '1996-07-04 00:00:00'),
                                       (10249, 'ALFKI', '1996-08-04'),
                                       (10250, NULL, 'not a date');
             INSERT INTO order_details VALUES (10248, 1, 18.0, 12, 0.0),
                                              (10249, 1, 18.0, 10, 0.1),
                                              (10250, 2, 10.0, 5, 0.0);",
        )
        .unwrap();
        source
    }

    #[test]
    fn test_fetch_order_lines() {
        let dir = TempDir::new().unwrap();
        let source = seeded_source(&dir);
        let lines = source.fetch_order_lines(None).unwrap();
        assert_eq!(lines.len(), 3);

        let bad = lines.iter().find(|l| l.product_id == Some(2)).unwrap();
        assert!(bad.order_date.is_none());
        assert!(bad.customer_id.is_none());
        assert_eq!(bad.quantity, Some(5.0));
    }

    #[test]
    fn test_fetch_order_lines_with_range() {
        let dir = TempDir::new().unwrap();
        let source = seeded_source(&dir);
        let start = NaiveDate::from_ymd_opt(1996, 8, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
        let end = NaiveDate::from_ymd_opt(1996, 12, 31).and_then(|d| d.and_hms_opt(0, 0, 0));
        let lines = source
            .fetch_order_lines(Some(DateRange::new(start, end)))
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, Some(10.0));
    }

    #[test]
    fn test_catalog_lookups() {
        let dir = TempDir::new().unwrap();
        let source = seeded_source(&dir);
        assert_eq!(source.fetch_categories().unwrap().len(), 2);
        assert_eq!(source.fetch_suppliers().unwrap().len(), 1);

        let product = source.fetch_product(1).unwrap().unwrap();
        assert_eq!(product.product_name, "Chai");
        assert_eq!(product.unit_price, Some(18.0));
        assert!(source.fetch_product(99).unwrap().is_none());

        let customer = source.fetch_customer("ALFKI").unwrap().unwrap();
        assert_eq!(customer.country.as_deref(), Some("Germany"));
    }

    #[test]
    fn test_recent_revenue_stats() {
        let dir = TempDir::new().unwrap();
        let source = seeded_source(&dir);
        let stats = source.fetch_recent_revenue_stats(1, 10).unwrap().unwrap();
        assert_eq!(stats.avg_quantity, 11.0);
        assert!((stats.avg_revenue - (216.0 + 162.0) / 2.0).abs() < 1e-9);
        assert!(source.fetch_recent_revenue_stats(42, 10).unwrap().is_none());
    }

    #[test]
    fn test_missing_database_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let source = SqliteSource::new(dir.path().join("missing.db"));
        assert!(matches!(
            source.fetch_order_lines(None),
            Err(SourceError::Unavailable(_))
        ));
    }
}
