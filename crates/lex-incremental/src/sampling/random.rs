//! Uniform random sampling.

use super::{take_rows, target_size, validate_ratio};
use crate::error::Result;
use polars::prelude::*;
use rand::prelude::*;

/// Pick `target_size(n, ratio)` row indices with a partial Fisher-Yates shuffle.
///
/// Only the first `k` positions are shuffled. The chosen indices are returned
/// sorted so the sample keeps source row order.
pub fn random_indices(n: usize, ratio: f64, seed: u64) -> Result<Vec<usize>> {
    validate_ratio(ratio)?;
    let k = target_size(n, ratio);
    if k == n {
        return Ok((0..n).collect());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices.sort_unstable();
    Ok(indices)
}

/// Draw a uniform random sample of `df`.
pub fn random_sample(df: &DataFrame, ratio: f64, seed: u64) -> Result<DataFrame> {
    validate_ratio(ratio)?;
    if df.height() == 0 {
        return Ok(df.clear());
    }
    if ratio >= 1.0 {
        return Ok(df.clone());
    }
    let indices = random_indices(df.height(), ratio, seed)?;
    Ok(take_rows(df, &indices)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(n: i64) -> DataFrame {
        df! { "x" => (0..n).collect::<Vec<i64>>() }.unwrap()
    }

    #[test]
    fn test_sample_size_matches_ratio() {
        let df = numbers(1000);
        let sample = random_sample(&df, 0.1, 42).unwrap();
        assert_eq!(sample.height(), 100);
    }

    #[test]
    fn test_full_ratio_returns_copy() {
        let df = numbers(37);
        let sample = random_sample(&df, 1.0, 42).unwrap();
        assert!(sample.equals(&df));
    }

    #[test]
    fn test_same_seed_same_sample() {
        let df = numbers(500);
        let a = random_sample(&df, 0.2, 7).unwrap();
        let b = random_sample(&df, 0.2, 7).unwrap();
        assert!(a.equals(&b));

        let c = random_sample(&df, 0.2, 8).unwrap();
        assert!(!a.equals(&c));
    }

    #[test]
    fn test_sample_keeps_source_order() {
        let df = numbers(200);
        let sample = random_sample(&df, 0.3, 1).unwrap();
        let values: Vec<i64> = sample
            .column("x")
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        let mut sorted = values.clone();
        sorted.sort_unstable();
        assert_eq!(values, sorted);
    }

    #[test]
    fn test_empty_source_returns_empty() {
        let df = numbers(0);
        let sample = random_sample(&df, 0.5, 42).unwrap();
        assert_eq!(sample.height(), 0);
        assert_eq!(sample.width(), 1);
    }

    #[test]
    fn test_invalid_ratio_is_rejected() {
        let df = numbers(10);
        let err = random_sample(&df, 0.0, 42).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        assert!(random_sample(&df, 1.5, 42).is_err());
    }

    #[test]
    fn test_tiny_ratio_draws_one_row() {
        let indices = random_indices(100, 0.0001, 3).unwrap();
        assert_eq!(indices.len(), 1);
    }
}
