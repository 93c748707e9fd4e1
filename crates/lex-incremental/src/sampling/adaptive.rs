//! Adaptive strategy selection.

use super::target_size;
use crate::config::{AdaptiveThresholds, SamplingStrategyKind};
use polars::prelude::*;
use tracing::debug;

/// Choose Stratified when the label column is a usable class label, Random otherwise.
///
/// A label is usable when it exists, has between `min_classes` and
/// `max_classes` distinct non-null values, its cardinality ratio stays below
/// `max_cardinality_ratio` and the sample would hold at least
/// `min_samples_per_class` rows per class on average.
pub fn select_strategy(
    df: &DataFrame,
    label_column: Option<&str>,
    ratio: f64,
    thresholds: &AdaptiveThresholds,
) -> SamplingStrategyKind {
    let Some(label) = label_column else {
        return SamplingStrategyKind::Random;
    };
    let Ok(column) = df.column(label) else {
        debug!(label, "Label column not in dataset, using random sampling");
        return SamplingStrategyKind::Random;
    };

    let n = df.height();
    if n == 0 {
        return SamplingStrategyKind::Random;
    }

    let classes = column
        .as_materialized_series()
        .drop_nulls()
        .n_unique()
        .unwrap_or(0);
    let cardinality_ratio = classes as f64 / n as f64;
    let per_class = if classes == 0 {
        0.0
    } else {
        target_size(n, ratio) as f64 / classes as f64
    };

    let usable = (thresholds.min_classes..=thresholds.max_classes).contains(&classes)
        && cardinality_ratio < thresholds.max_cardinality_ratio
        && per_class >= thresholds.min_samples_per_class;

    debug!(
        label,
        classes, cardinality_ratio, per_class, usable, "Adaptive strategy check"
    );

    if usable {
        SamplingStrategyKind::Stratified
    } else {
        SamplingStrategyKind::Random
    }
}
