//! Column-wise cleaning of fetched order lines

use crate::error::ExtractionError;
use crate::stats;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fill value for a categorical column with no observed value at all
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Counts of what cleaning changed during one extraction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows: usize,
    /// Missing values imputed, per column
    pub missing_filled: BTreeMap<String, usize>,
    /// Non-positive values replaced by the median, per numeric column
    pub non_positive_replaced: BTreeMap<String, usize>,
    /// Values beyond 3σ replaced by the median, per numeric column
    pub outliers_replaced: BTreeMap<String, usize>,
    pub dates_pinned: usize,
}

impl CleaningReport {
    pub fn total_outliers(&self) -> usize {
        self.outliers_replaced.values().sum()
    }

    pub fn total_missing(&self) -> usize {
        self.missing_filled.values().sum()
    }
}

/// Impute, replace non-positive values and clamp outliers in one numeric column.
///
/// NaN counts as missing. Fails when the column has no observed value.
pub(crate) fn clean_numeric(
    column: &'static str,
    raw: &[Option<f64>],
    report: &mut CleaningReport,
) -> Result<Vec<f64>, ExtractionError> {
    let observed: Vec<f64> = raw.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    let fill = stats::median(&observed).ok_or(ExtractionError::EmptyColumn(column))?;

    let mut missing = 0;
    let mut values: Vec<f64> = raw
        .iter()
        .map(|v| match v {
            Some(v) if v.is_finite() => *v,
            _ => {
                missing += 1;
                fill
            }
        })
        .collect();

    let med = stats::median(&values).unwrap_or(fill);
    let mut non_positive = 0;
    for v in values.iter_mut() {
        if *v <= 0.0 {
            *v = med;
            non_positive += 1;
        }
    }

    let outliers = stats::clamp_outliers(&mut values);

    report.missing_filled.insert(column.to_string(), missing);
    report
        .non_positive_replaced
        .insert(column.to_string(), non_positive);
    report.outliers_replaced.insert(column.to_string(), outliers);
    Ok(values)
}

/// Coerce a categorical column to strings and fill gaps with its mode
pub(crate) fn clean_categorical(
    column: &'static str,
    raw: &[Option<String>],
    report: &mut CleaningReport,
) -> Vec<String> {
    let fill = stats::mode(raw.iter().flatten().map(String::as_str))
        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

    let mut missing = 0;
    let values = raw
        .iter()
        .map(|v| match v {
            Some(v) => v.clone(),
            None => {
                missing += 1;
                fill.clone()
            }
        })
        .collect();

    report.missing_filled.insert(column.to_string(), missing);
    values
}

/// Earliest order date accepted as valid
pub fn min_valid_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1990, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Pin missing or out-of-window dates to the median valid date
pub(crate) fn clean_dates(
    raw: &[Option<NaiveDateTime>],
    now: NaiveDateTime,
    report: &mut CleaningReport,
) -> Result<Vec<NaiveDateTime>, ExtractionError> {
    let floor = min_valid_date();
    let in_window = |d: &NaiveDateTime| *d >= floor && *d <= now;

    let mut valid: Vec<NaiveDateTime> = raw.iter().flatten().copied().filter(in_window).collect();
    if valid.is_empty() {
        return Err(ExtractionError::NoValidDates);
    }
    valid.sort();
    let pin = median_date(&valid);

    let mut pinned = 0;
    let dates = raw
        .iter()
        .map(|d| match d {
            Some(d) if in_window(d) => *d,
            _ => {
                pinned += 1;
                pin
            }
        })
        .collect();

    report.dates_pinned = pinned;
    Ok(dates)
}

/// Median of a sorted, non-empty slice; even lengths take the midpoint
fn median_date(sorted: &[NaiveDateTime]) -> NaiveDateTime {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        return sorted[mid];
    }
    let (lo, hi) = (sorted[mid - 1], sorted[mid]);
    lo + (hi - lo) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_numeric_fill_and_non_positive() {
        let mut report = CleaningReport::default();
        let raw = vec![Some(4.0), None, Some(-1.0), Some(6.0), Some(f64::NAN)];
        let cleaned = clean_numeric("quantity", &raw, &mut report).unwrap();
        // observed {4, -1, 6} → fill 4; after fill {4,4,-1,6,4} → median 4
        assert_eq!(cleaned, vec![4.0, 4.0, 4.0, 6.0, 4.0]);
        assert_eq!(report.missing_filled["quantity"], 2);
        assert_eq!(report.non_positive_replaced["quantity"], 1);
    }

    #[test]
    fn test_empty_numeric_column_fails() {
        let mut report = CleaningReport::default();
        let err = clean_numeric("discount", &[None, None], &mut report).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyColumn("discount")));
    }

    #[test]
    fn test_categorical_mode_and_unknown() {
        let mut report = CleaningReport::default();
        let raw = vec![Some("2".to_string()), None, Some("2".to_string()), Some("1".to_string())];
        assert_eq!(clean_categorical("category_id", &raw, &mut report), vec!["2", "2", "2", "1"]);

        let all_missing = clean_categorical("customer_id", &[None, None], &mut report);
        assert_eq!(all_missing, vec![UNKNOWN_CATEGORY, UNKNOWN_CATEGORY]);
        assert_eq!(report.missing_filled["customer_id"], 2);
    }

    #[test]
    fn test_dates_pinned_to_median() {
        let mut report = CleaningReport::default();
        let now = date(2024, 1, 1);
        let raw = vec![
            Some(date(2020, 1, 1)),
            Some(date(2020, 1, 3)),
            Some(date(2020, 1, 5)),
            Some(date(1985, 6, 1)),
            Some(date(2030, 1, 1)),
            None,
        ];
        let dates = clean_dates(&raw, now, &mut report).unwrap();
        assert_eq!(report.dates_pinned, 3);
        assert_eq!(dates[3], date(2020, 1, 3));
        assert_eq!(dates[4], date(2020, 1, 3));
        assert_eq!(dates[5], date(2020, 1, 3));
    }

    #[test]
    fn test_no_valid_dates() {
        let mut report = CleaningReport::default();
        let err = clean_dates(&[Some(date(1970, 1, 1)), None], date(2024, 1, 1), &mut report)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::NoValidDates));
    }
}
