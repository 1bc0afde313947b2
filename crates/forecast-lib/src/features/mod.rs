//! Feature table construction
//!
//! Turns cleaned sales rows into monthly aggregates and encodes them into a
//! numeric table with a fixed column order. The column-naming rules here are
//! shared with request-time feature construction so the two never drift.

mod aggregate;
mod encode;

pub use aggregate::{aggregate, clamp_outliers};
pub use encode::{encode, schema_for};

use crate::error::FeatureError;
use crate::models::{MonthlyAggregate, SalesRow};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Numeric columns that lead every feature vector, in order
pub const BASE_COLUMNS: [&str; 5] = ["product_id", "year", "month", "total_revenue", "avg_price"];

/// Column the regressors learn to predict
pub const TARGET_COLUMN: &str = "total_quantity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorKind {
    Category,
    Supplier,
}

impl IndicatorKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            IndicatorKind::Category => "category",
            IndicatorKind::Supplier => "supplier",
        }
    }
}

/// Indicator column name for one identifier, e.g. `category_3`
pub fn indicator_name(kind: IndicatorKind, id: &str) -> String {
    format!("{}_{}", kind.prefix(), id)
}

/// Ordered feature-column names fixed at training time.
///
/// There is no mutating API; a schema only ever comes from encoding or from
/// a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }
}

/// Named feature values in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, overwriting an existing entry of the same name
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut vector = FeatureVector::new();
        for (name, value) in iter {
            vector.set(name, value);
        }
        vector
    }
}

/// Encoded rows aligned to a [`FeatureSchema`], plus the target column
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub features: Array2<f64>,
    pub target: Array1<f64>,
}

impl FeatureTable {
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }
}

/// Identifier sets that drive indicator columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryDomain {
    pub categories: BTreeSet<String>,
    pub suppliers: BTreeSet<String>,
}

impl CategoryDomain {
    /// Identifiers present in a batch of aggregates
    pub fn observed(aggregates: &[MonthlyAggregate]) -> Self {
        Self {
            categories: aggregates.iter().map(|a| a.category_id.clone()).collect(),
            suppliers: aggregates.iter().map(|a| a.supplier_id.clone()).collect(),
        }
    }

    /// Identifiers from the catalog tables, independent of sales history
    pub fn from_catalog(categories: &BTreeSet<i64>, suppliers: &BTreeSet<i64>) -> Self {
        Self {
            categories: categories.iter().map(i64::to_string).collect(),
            suppliers: suppliers.iter().map(i64::to_string).collect(),
        }
    }

    pub fn union(mut self, other: CategoryDomain) -> Self {
        self.categories.extend(other.categories);
        self.suppliers.extend(other.suppliers);
        self
    }
}

/// Where indicator columns come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainPolicy {
    /// Catalog identifiers plus anything observed in the batch
    #[default]
    Catalog,
    /// Only identifiers observed in the training batch
    Observed,
}

impl FromStr for DomainPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "catalog" => Ok(DomainPolicy::Catalog),
            "observed" => Ok(DomainPolicy::Observed),
            other => Err(format!("unknown domain policy '{}'", other)),
        }
    }
}

impl fmt::Display for DomainPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainPolicy::Catalog => write!(f, "catalog"),
            DomainPolicy::Observed => write!(f, "observed"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureConfig {
    pub domain_policy: DomainPolicy,
}

/// Aggregates, encodes and resolves the indicator domain
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn aggregate(&self, rows: &[SalesRow]) -> Vec<MonthlyAggregate> {
        let aggregates = aggregate(rows);
        debug!(rows = rows.len(), aggregates = aggregates.len(), "Aggregated sales rows");
        aggregates
    }

    pub fn clamp_outliers(&self, aggregates: &mut [MonthlyAggregate]) -> usize {
        clamp_outliers(aggregates)
    }

    /// Indicator domain for a batch under the configured policy
    pub fn domain(
        &self,
        aggregates: &[MonthlyAggregate],
        catalog: Option<&CategoryDomain>,
    ) -> CategoryDomain {
        let observed = CategoryDomain::observed(aggregates);
        match (self.config.domain_policy, catalog) {
            (DomainPolicy::Catalog, Some(catalog)) => catalog.clone().union(observed),
            _ => observed,
        }
    }

    pub fn encode(
        &self,
        aggregates: &[MonthlyAggregate],
        domain: &CategoryDomain,
    ) -> Result<(FeatureTable, FeatureSchema), FeatureError> {
        encode(aggregates, domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg(category: &str, supplier: &str) -> MonthlyAggregate {
        MonthlyAggregate {
            product_id: "1".to_string(),
            category_id: category.to_string(),
            supplier_id: supplier.to_string(),
            year: 2023,
            month: 1,
            total_quantity: 1.0,
            total_revenue: 1.0,
            avg_price: 1.0,
        }
    }

    #[test]
    fn test_feature_vector_set_overwrites() {
        let mut v = FeatureVector::new();
        v.set("a", 1.0);
        v.set("b", 2.0);
        v.set("a", 3.0);
        assert_eq!(v.len(), 2);
        assert_eq!(v.get("a"), Some(3.0));
        assert_eq!(v.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_indicator_name() {
        assert_eq!(indicator_name(IndicatorKind::Category, "7"), "category_7");
        assert_eq!(indicator_name(IndicatorKind::Supplier, "12"), "supplier_12");
    }

    #[test]
    fn test_domain_policy_parse() {
        assert_eq!("Catalog".parse::<DomainPolicy>().unwrap(), DomainPolicy::Catalog);
        assert_eq!("observed".parse::<DomainPolicy>().unwrap(), DomainPolicy::Observed);
        assert!("nope".parse::<DomainPolicy>().is_err());
    }

    #[test]
    fn test_domain_by_policy() {
        let aggs = vec![agg("1", "1")];
        let catalog = CategoryDomain::from_catalog(&BTreeSet::from([1, 2]), &BTreeSet::from([1]));

        let builder = FeatureBuilder::default();
        let domain = builder.domain(&aggs, Some(&catalog));
        assert!(domain.categories.contains("2"));

        let builder = FeatureBuilder::new(FeatureConfig {
            domain_policy: DomainPolicy::Observed,
        });
        let domain = builder.domain(&aggs, Some(&catalog));
        assert_eq!(domain.categories.len(), 1);
    }

    #[test]
    fn test_schema_is_sorted_and_grouped() {
        let aggs = vec![agg("2", "1"), agg("1", "1")];
        let schema = schema_for(&CategoryDomain::observed(&aggs));
        assert_eq!(
            schema.columns()[BASE_COLUMNS.len()..],
            ["category_1", "category_2", "supplier_1"]
        );
    }
}
