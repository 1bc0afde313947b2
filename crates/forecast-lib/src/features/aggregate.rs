//! Monthly per-product aggregation

use crate::models::{MonthlyAggregate, SalesRow};
use crate::stats;
use std::collections::BTreeMap;

type AggregateKey = (String, String, String, i32, u32);

#[derive(Default)]
struct Accumulator {
    total_quantity: f64,
    total_revenue: f64,
    price_sum: f64,
    lines: usize,
}

/// Group rows by (product, category, supplier, year, month), sorted by key
pub fn aggregate(rows: &[SalesRow]) -> Vec<MonthlyAggregate> {
    let mut groups: BTreeMap<AggregateKey, Accumulator> = BTreeMap::new();
    for row in rows {
        let key = (
            row.product_id.clone(),
            row.category_id.clone(),
            row.supplier_id.clone(),
            row.year,
            row.month,
        );
        let acc = groups.entry(key).or_default();
        acc.total_quantity += row.quantity;
        acc.total_revenue += row.revenue;
        acc.price_sum += row.unit_price;
        acc.lines += 1;
    }

    groups
        .into_iter()
        .map(
            |((product_id, category_id, supplier_id, year, month), acc)| MonthlyAggregate {
                product_id,
                category_id,
                supplier_id,
                year,
                month,
                total_quantity: acc.total_quantity,
                total_revenue: acc.total_revenue,
                avg_price: acc.price_sum / acc.lines as f64,
            },
        )
        .collect()
}

/// Second-stage 3σ cleaning over the aggregate measures.
///
/// Returns the number of replaced values across all three columns.
pub fn clamp_outliers(aggregates: &mut [MonthlyAggregate]) -> usize {
    fn quantity(a: &mut MonthlyAggregate) -> &mut f64 {
        &mut a.total_quantity
    }
    fn revenue(a: &mut MonthlyAggregate) -> &mut f64 {
        &mut a.total_revenue
    }
    fn price(a: &mut MonthlyAggregate) -> &mut f64 {
        &mut a.avg_price
    }
    let accessors: [fn(&mut MonthlyAggregate) -> &mut f64; 3] = [quantity, revenue, price];

    let mut replaced = 0;
    for field in accessors {
        let mut column: Vec<f64> = aggregates.iter_mut().map(|a| *field(a)).collect();
        replaced += stats::clamp_outliers(&mut column);
        for (agg, value) in aggregates.iter_mut().zip(column) {
            *field(agg) = value;
        }
    }
    replaced
}
