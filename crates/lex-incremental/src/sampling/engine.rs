//! Sampling engine: strategy selection, minimum sample size and validation.

use super::stratified::{StratumKey, class_proportions};
use super::{random_sample, select_strategy, stratified_sample, target_size, validate_ratio};
use crate::config::{SamplingConfig, SamplingStrategyKind};
use crate::error::{IncrementalError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Result of checking a sample against its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleValidation {
    pub expected_size: usize,
    pub actual_size: usize,
    /// Actual size is within one row of the expected size.
    pub size_ok: bool,
    /// Absolute difference between sample and source share per class.
    pub class_deltas: BTreeMap<String, f64>,
    pub within_tolerance: bool,
    pub warnings: Vec<String>,
}

impl SampleValidation {
    pub fn is_valid(&self) -> bool {
        self.size_ok && self.within_tolerance
    }
}

/// A drawn sample with the parameters that produced it.
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub data: DataFrame,
    pub strategy: SamplingStrategyKind,
    pub requested_ratio: f64,
    /// Ratio actually used after applying the minimum sample size.
    pub effective_ratio: f64,
    pub validation: SampleValidation,
}

/// Draws stage samples according to a [`SamplingConfig`].
#[derive(Debug, Clone, Default)]
pub struct SamplingEngine {
    config: SamplingConfig,
}

impl SamplingEngine {
    pub fn new(config: SamplingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Raise `ratio` so the sample holds at least `min_sample_size` rows, capped at 1.0.
    pub fn effective_ratio(&self, rows: usize, ratio: f64) -> f64 {
        if rows == 0 {
            return ratio;
        }
        let floor = (self.config.min_sample_size as f64 / rows as f64).min(1.0);
        ratio.max(floor)
    }

    /// Strategy for a sample of `df` at `ratio`: the forced one, or the adaptive choice.
    pub fn select_strategy(&self, df: &DataFrame, ratio: f64) -> SamplingStrategyKind {
        match self.config.strategy {
            Some(SamplingStrategyKind::Random) => SamplingStrategyKind::Random,
            Some(SamplingStrategyKind::Stratified) => SamplingStrategyKind::Stratified,
            Some(SamplingStrategyKind::Adaptive) | None => select_strategy(
                df,
                self.config.label_column.as_deref(),
                ratio,
                &self.config.adaptive,
            ),
        }
    }

    /// Draw a sample of `df`.
    ///
    /// The ratio is validated before any work. Validation problems in the
    /// result are logged and reported in [`SampleOutcome::validation`].
    pub fn sample(&self, df: &DataFrame, ratio: f64, seed: u64) -> Result<SampleOutcome> {
        validate_ratio(ratio)?;
        let effective_ratio = self.effective_ratio(df.height(), ratio);
        let strategy = self.select_strategy(df, effective_ratio);

        let data = match strategy {
            SamplingStrategyKind::Stratified => {
                let label = self.config.label_column.as_deref().ok_or_else(|| {
                    IncrementalError::InvalidConfig(
                        "stratified sampling requires a label column".to_string(),
                    )
                })?;
                stratified_sample(df, label, effective_ratio, seed)?
            }
            _ => random_sample(df, effective_ratio, seed)?,
        };

        debug!(
            strategy = strategy.as_str(),
            requested_ratio = ratio,
            effective_ratio,
            rows = data.height(),
            "Drew sample"
        );

        let validation = self.validate(df, &data, effective_ratio, strategy);
        Ok(SampleOutcome {
            data,
            strategy,
            requested_ratio: ratio,
            effective_ratio,
            validation,
        })
    }

    /// Check a sample's size and, for stratified samples, its class proportions.
    ///
    /// Never fails; problems are logged and returned as warnings.
    pub fn validate(
        &self,
        source: &DataFrame,
        sample: &DataFrame,
        ratio: f64,
        strategy: SamplingStrategyKind,
    ) -> SampleValidation {
        let expected_size = target_size(source.height(), ratio);
        let actual_size = sample.height();
        let size_ok = expected_size.abs_diff(actual_size) <= 1;

        let mut warnings = Vec::new();
        if !size_ok {
            warnings.push(format!(
                "sample has {actual_size} rows, expected {expected_size}"
            ));
        }

        let mut class_deltas = BTreeMap::new();
        let mut within_tolerance = true;
        if strategy == SamplingStrategyKind::Stratified
            && let Some(label) = self.config.label_column.as_deref()
        {
            match (
                class_proportions(source, label),
                class_proportions(sample, label),
            ) {
                (Ok(expected), Ok(actual)) => {
                    let keys: std::collections::BTreeSet<&StratumKey> =
                        expected.keys().chain(actual.keys()).collect();
                    for key in keys {
                        let delta = (expected.get(key).copied().unwrap_or(0.0)
                            - actual.get(key).copied().unwrap_or(0.0))
                        .abs();
                        let name = key.clone().unwrap_or_else(|| "<null>".to_string());
                        if delta > self.config.stratification_tolerance {
                            within_tolerance = false;
                            warnings.push(format!(
                                "class '{name}' proportion differs by {delta:.4} (tolerance {})",
                                self.config.stratification_tolerance
                            ));
                        }
                        class_deltas.insert(name, delta);
                    }
                }
                (Err(e), _) | (_, Err(e)) => {
                    within_tolerance = false;
                    warnings.push(format!("could not compute class proportions: {e}"));
                }
            }
        }

        for warning in &warnings {
            warn!("Sample validation: {}", warning);
        }

        SampleValidation {
            expected_size,
            actual_size,
            size_ok,
            class_deltas,
            within_tolerance,
            warnings,
        }
    }
}

/// Sample `df` at `ratio` using `config`.
pub fn sample(df: &DataFrame, ratio: f64, config: &SamplingConfig, seed: u64) -> Result<DataFrame> {
    Ok(SamplingEngine::new(config.clone())
        .sample(df, ratio, seed)?
        .data)
}
