//! One-hot encoding of monthly aggregates into a feature table

use super::{indicator_name, CategoryDomain, FeatureSchema, FeatureTable, IndicatorKind, BASE_COLUMNS};
use crate::error::FeatureError;
use crate::models::MonthlyAggregate;
use ndarray::{Array1, Array2};

/// Numeric identifiers first in numeric order ("2" before "10"), then any
/// non-numeric ones lexicographically
fn id_order(id: &str) -> (bool, i64, &str) {
    match id.trim().parse::<i64>() {
        Ok(n) => (false, n, id),
        Err(_) => (true, 0, id),
    }
}

fn sorted_ids<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<&'a String> {
    let mut ids: Vec<&String> = ids.collect();
    ids.sort_by(|a, b| id_order(a).cmp(&id_order(b)));
    ids
}

/// Column order for a domain: base columns, then category then supplier
/// indicators, each group ordered by [`id_order`]
pub fn schema_for(domain: &CategoryDomain) -> FeatureSchema {
    let columns = BASE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(
            sorted_ids(domain.categories.iter())
                .into_iter()
                .map(|id| indicator_name(IndicatorKind::Category, id)),
        )
        .chain(
            sorted_ids(domain.suppliers.iter())
                .into_iter()
                .map(|id| indicator_name(IndicatorKind::Supplier, id)),
        )
        .collect();
    FeatureSchema::new(columns)
}

/// Encode aggregates against `domain`; identifiers outside the domain get
/// all-zero indicators
pub fn encode(
    aggregates: &[MonthlyAggregate],
    domain: &CategoryDomain,
) -> Result<(FeatureTable, FeatureSchema), FeatureError> {
    let schema = schema_for(domain);
    let width = schema.len();
    let mut features = Array2::<f64>::zeros((aggregates.len(), width));
    let mut target = Array1::<f64>::zeros(aggregates.len());

    for (i, agg) in aggregates.iter().enumerate() {
        let product_id: f64 = agg.product_id.trim().parse().map_err(|_| FeatureError::NonNumeric {
            column: "product_id",
            value: agg.product_id.clone(),
        })?;

        let base = [
            product_id,
            agg.year as f64,
            agg.month as f64,
            agg.total_revenue,
            agg.avg_price,
        ];
        for (j, v) in base.into_iter().enumerate() {
            features[[i, j]] = v;
        }

        for (kind, id) in [
            (IndicatorKind::Category, &agg.category_id),
            (IndicatorKind::Supplier, &agg.supplier_id),
        ] {
            if let Some(j) = schema.index_of(&indicator_name(kind, id)) {
                features[[i, j]] = 1.0;
            }
        }

        target[i] = agg.total_quantity;
    }

    Ok((FeatureTable { features, target }, schema))
}
