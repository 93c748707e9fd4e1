//! Convergence detection between consecutive stage analyses.
//!
//! Numeric columns compare mean and standard deviation; categorical columns
//! compare entropy only, so a shift between categories with equal entropy
//! goes unnoticed.

use crate::types::SampleAnalysis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values closer to zero than this are treated as zero.
const NEAR_ZERO: f64 = 1e-12;

/// Comparison of two stage analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub previous_stage: u8,
    pub current_stage: u8,
    pub threshold: f64,
    /// Mean of all relative differences (0 when nothing was comparable).
    pub mean_relative_difference: f64,
    /// Relative difference per compared metric, keyed `column.metric`.
    pub metrics: BTreeMap<String, f64>,
    pub converged: bool,
}

/// `|current - previous| / |previous|`, 0 when both are near zero and 1 when
/// only the previous value is.
pub fn relative_difference(previous: f64, current: f64) -> f64 {
    let prev_zero = previous.abs() < NEAR_ZERO;
    let cur_zero = current.abs() < NEAR_ZERO;
    match (prev_zero, cur_zero) {
        (true, true) => 0.0,
        (true, false) => 1.0,
        _ => (current - previous).abs() / previous.abs(),
    }
}

/// Compare two analyses column by column.
///
/// Without any comparable metric the analyses converge exactly when they
/// have the same column names, so an analysis always converges with itself.
pub fn check_convergence(
    previous: &SampleAnalysis,
    current: &SampleAnalysis,
    threshold: f64,
) -> ConvergenceReport {
    let mut metrics = BTreeMap::new();

    for prev_col in &previous.columns {
        let Some(cur_col) = current.column(&prev_col.name) else {
            continue;
        };

        if let (Some(p), Some(c)) = (&prev_col.numeric, &cur_col.numeric) {
            metrics.insert(
                format!("{}.mean", prev_col.name),
                relative_difference(p.mean, c.mean),
            );
            metrics.insert(
                format!("{}.std_dev", prev_col.name),
                relative_difference(p.std_dev, c.std_dev),
            );
        } else if let (Some(p), Some(c)) = (&prev_col.categorical, &cur_col.categorical) {
            metrics.insert(
                format!("{}.entropy", prev_col.name),
                relative_difference(p.entropy, c.entropy),
            );
        }
    }

    let (mean_relative_difference, converged) = if metrics.is_empty() {
        (0.0, previous.column_names() == current.column_names())
    } else {
        let mean = metrics.values().sum::<f64>() / metrics.len() as f64;
        (mean, mean < threshold)
    };

    ConvergenceReport {
        previous_stage: previous.stage,
        current_stage: current.stage,
        threshold,
        mean_relative_difference,
        metrics,
        converged,
    }
}
