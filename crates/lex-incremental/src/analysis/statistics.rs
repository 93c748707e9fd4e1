//! Statistical summaries for column analysis.

use crate::types::{CategoricalStats, NumericStats};
use crate::utils::{f64_values, index_quartiles, median_sorted, string_values};
use anyhow::Result;
use polars::prelude::*;
use std::collections::BTreeMap;

/// Numeric summary of the non-null values of `series`, or `None` when all are null.
pub(crate) fn numeric_stats(series: &Series) -> Result<Option<NumericStats>> {
    let mut values = f64_values(series)?;
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return Ok(None);
    }
    values.sort_by(f64::total_cmp);

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = sample_variance(&values, mean);
    let median = median_sorted(&values).unwrap_or(mean);
    let (q1, q3) = index_quartiles(&values).unwrap_or((mean, mean));
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;
    let outlier_count = values.iter().filter(|&&v| v < lower || v > upper).count();

    Ok(Some(NumericStats {
        mean,
        median,
        std_dev: variance.sqrt(),
        variance,
        min: values[0],
        max: values[values.len() - 1],
        q1,
        q3,
        outlier_count,
    }))
}

/// Sample variance with an n - 1 denominator; 0 for fewer than two values.
pub(crate) fn sample_variance(values: &[f64], mean: f64) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0)
}

/// Frequency summary of the non-null values of `series`.
pub(crate) fn categorical_stats(
    series: &Series,
    high_cardinality: usize,
) -> Result<Option<CategoricalStats>> {
    let mut value_counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in string_values(series)?.into_iter().flatten() {
        *value_counts.entry(value).or_insert(0) += 1;
    }
    if value_counts.is_empty() {
        return Ok(None);
    }

    // BTreeMap iteration makes ties resolve to the smallest value.
    let mut most_frequent: Option<(&String, usize)> = None;
    for (value, &count) in &value_counts {
        if most_frequent.is_none_or(|(_, best)| count > best) {
            most_frequent = Some((value, count));
        }
    }
    let most_frequent = most_frequent.map(|(value, _)| value.clone());

    let cardinality = value_counts.len();
    let entropy = shannon_entropy(value_counts.values().copied());

    Ok(Some(CategoricalStats {
        most_frequent,
        value_counts,
        cardinality,
        entropy,
        high_cardinality: cardinality > high_cardinality,
    }))
}

/// Shannon entropy in bits of a frequency distribution.
pub fn shannon_entropy(counts: impl IntoIterator<Item = usize>) -> f64 {
    let counts: Vec<usize> = counts.into_iter().filter(|&c| c > 0).collect();
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_stats_basic() {
        let series = Series::new("val".into(), &[1.0f64, 2.0, 3.0, 4.0, 5.0]);
        let stats = numeric_stats(&series).unwrap().unwrap();
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.median, 3.0);
        assert!((stats.variance - 2.5).abs() < 1e-12);
        assert!((stats.std_dev - 2.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.q1, 2.0);
        assert_eq!(stats.q3, 4.0);
        assert_eq!(stats.outlier_count, 0);
    }

    #[test]
    fn test_numeric_stats_counts_outliers() {
        let series = Series::new("val".into(), &[10i64, 11, 12, 11, 10, 12, 11, 500]);
        let stats = numeric_stats(&series).unwrap().unwrap();
        assert_eq!(stats.outlier_count, 1);
    }

    #[test]
    fn test_numeric_stats_ignores_nulls() {
        let series = Series::new("val".into(), &[Some(2.0f64), None, Some(4.0)]);
        let stats = numeric_stats(&series).unwrap().unwrap();
        assert_eq!(stats.mean, 3.0);
    }

    #[test]
    fn test_numeric_stats_all_null() {
        let series = Series::new("val".into(), &[None::<f64>, None]);
        assert!(numeric_stats(&series).unwrap().is_none());
    }

    #[test]
    fn test_single_value_has_zero_variance() {
        let series = Series::new("val".into(), &[5.0f64]);
        let stats = numeric_stats(&series).unwrap().unwrap();
        assert_eq!(stats.variance, 0.0);
    }

    #[test]
    fn test_categorical_stats() {
        let series = Series::new("city".into(), &["a", "b", "a", "a", "c", "b"]);
        let stats = categorical_stats(&series, 50).unwrap().unwrap();
        assert_eq!(stats.most_frequent.as_deref(), Some("a"));
        assert_eq!(stats.cardinality, 3);
        assert_eq!(stats.value_counts.get("b"), Some(&2));
        assert!(!stats.high_cardinality);
    }

    #[test]
    fn test_categorical_high_cardinality() {
        let values: Vec<String> = (0..60).map(|i| format!("v{i}")).collect();
        let series = Series::new("code".into(), values);
        let stats = categorical_stats(&series, 50).unwrap().unwrap();
        assert!(stats.high_cardinality);
    }

    #[test]
    fn test_boolean_column_counts() {
        let series = Series::new("flag".into(), &[true, false, true]);
        let stats = categorical_stats(&series, 50).unwrap().unwrap();
        assert_eq!(stats.value_counts.get("true"), Some(&2));
    }

    #[test]
    fn test_shannon_entropy() {
        assert_eq!(shannon_entropy([10]), 0.0);
        assert!((shannon_entropy([5, 5]) - 1.0).abs() < 1e-12);
        assert!((shannon_entropy([1, 1, 1, 1]) - 2.0).abs() < 1e-12);
        assert_eq!(shannon_entropy(Vec::<usize>::new()), 0.0);
    }
}
