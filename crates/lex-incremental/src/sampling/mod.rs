//! Sampling strategies and the engine that drives them.
//!
//! Strategies are pure functions `(table, ratio, seed) -> table` that return
//! rows in source order. The [`SamplingEngine`] picks a strategy, enforces the
//! minimum sample size and validates the result.

pub mod adaptive;
pub mod engine;
pub mod random;
pub mod stratified;

pub use adaptive::select_strategy;
pub use engine::{SampleOutcome, SampleValidation, SamplingEngine, sample};
pub use random::random_sample;
pub use stratified::stratified_sample;

use crate::error::{IncrementalError, Result};
use polars::prelude::*;

/// Reject ratios outside `(0, 1]`, including NaN.
pub fn validate_ratio(ratio: f64) -> Result<()> {
    if ratio > 0.0 && ratio <= 1.0 {
        Ok(())
    } else {
        Err(IncrementalError::InvalidArgument(format!(
            "sample ratio must be in (0, 1], got {ratio}"
        )))
    }
}

/// Number of rows to draw: `max(1, round(n * ratio))`, or `n` for a full copy.
pub fn target_size(n: usize, ratio: f64) -> usize {
    if n == 0 {
        0
    } else if ratio >= 1.0 {
        n
    } else {
        ((n as f64 * ratio).round() as usize).clamp(1, n)
    }
}

/// Gather rows by index. Indices must be sorted to keep source order.
pub(crate) fn take_rows(df: &DataFrame, indices: &[usize]) -> PolarsResult<DataFrame> {
    let idx: Vec<IdxSize> = indices.iter().map(|&i| i as IdxSize).collect();
    let idx = IdxCa::from_vec("idx".into(), idx);
    df.take(&idx)
}
