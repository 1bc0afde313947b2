//! Column statistics shared by extraction cleaning and aggregate cleaning

use std::collections::BTreeMap;

/// Maximum number of outlier passes before giving up on a fixed point
pub const MAX_OUTLIER_PASSES: usize = 16;

/// Outlier cutoff in standard deviations
pub const OUTLIER_SIGMA: f64 = 3.0;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n − 1 denominator)
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

/// Median, averaging the two middle values for even lengths
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Most frequent value; ties go to the smallest value
pub fn mode<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(v, _)| v.to_string())
}

/// Replace values further than 3σ from the mean with the column median.
///
/// Passes repeat until nothing is flagged, so a second call on the output is a
/// no-op. Returns the number of replacements.
pub fn clamp_outliers(values: &mut [f64]) -> usize {
    let mut replaced = 0;
    for _ in 0..MAX_OUTLIER_PASSES {
        let (Some(m), Some(sd)) = (mean(values), sample_std(values)) else {
            break;
        };
        if !(sd > 0.0) {
            break;
        }
        let Some(med) = median(values) else { break };
        let mut flagged = 0;
        for v in values.iter_mut() {
            if (*v - m).abs() > OUTLIER_SIGMA * sd {
                *v = med;
                flagged += 1;
            }
        }
        if flagged == 0 {
            break;
        }
        replaced += flagged;
    }
    replaced
}
