//! Configuration types for the incremental preprocessing workflow.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic workflow setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sampling strategy used to draw a stage sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategyKind {
    /// Uniform sampling via a partial Fisher-Yates shuffle
    Random,
    /// Per-class reservoir sampling that preserves label proportions
    Stratified,
    /// Choose Stratified or Random from the label column's shape
    #[default]
    Adaptive,
}

impl SamplingStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Stratified => "stratified",
            Self::Adaptive => "adaptive",
        }
    }
}

/// Sample ratios for the four sampling stages. Stage 5 always uses the full dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageRatios {
    pub stage1: f64,
    pub stage2: f64,
    pub stage3: f64,
    pub stage4: f64,
}

impl Default for StageRatios {
    fn default() -> Self {
        Self {
            stage1: 0.01,
            stage2: 0.05,
            stage3: 0.10,
            stage4: 0.20,
        }
    }
}

impl StageRatios {
    /// Ratio for a stage number (1-5).
    pub fn for_stage(&self, stage: u8) -> f64 {
        match stage {
            1 => self.stage1,
            2 => self.stage2,
            3 => self.stage3,
            4 => self.stage4,
            _ => 1.0,
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.stage1, self.stage2, self.stage3, self.stage4]
    }
}

/// Thresholds the adaptive strategy uses to decide whether to stratify.
///
/// These are heuristics kept as configuration so they can be tuned per dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveThresholds {
    /// Minimum number of distinct label values
    pub min_classes: usize,
    /// Maximum number of distinct label values
    pub max_classes: usize,
    /// Distinct values divided by rows must stay below this
    pub max_cardinality_ratio: f64,
    /// Expected samples per class (target sample size / classes) must reach this
    pub min_samples_per_class: f64,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self {
            min_classes: 2,
            max_classes: 100,
            max_cardinality_ratio: 0.5,
            min_samples_per_class: 5.0,
        }
    }
}

/// Sampling configuration shared by every strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Force a strategy. `None` behaves like [`SamplingStrategyKind::Adaptive`].
    pub strategy: Option<SamplingStrategyKind>,

    /// Label column used for stratification.
    pub label_column: Option<String>,

    /// Maximum tolerated difference between sample and source class proportions.
    /// Default: 0.02
    pub stratification_tolerance: f64,

    /// Minimum number of rows a stage sample must contain.
    /// Default: 100
    pub min_sample_size: usize,

    pub adaptive: AdaptiveThresholds,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            strategy: None,
            label_column: None,
            stratification_tolerance: 0.02,
            min_sample_size: 100,
            adaptive: AdaptiveThresholds::default(),
        }
    }
}

/// Thresholds used by the sample analyzer, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Missing percentage above which a column has a high-severity issue.
    pub high_missing_pct: f64,
    /// Missing percentage above which a column has a medium-severity issue.
    pub moderate_missing_pct: f64,
    /// Outlier percentage (of non-null values) above which outliers are flagged.
    pub outlier_pct: f64,
    /// Unique count above which a categorical column is high-cardinality.
    pub high_cardinality: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            high_missing_pct: 50.0,
            moderate_missing_pct: 20.0,
            outlier_pct: 5.0,
            high_cardinality: 50,
        }
    }
}

/// Options for the generated transformation script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptOptions {
    /// Emit a comment above every rule step.
    pub include_comments: bool,
    /// Emit a schema check before the rules run.
    pub include_validation: bool,
    /// Emit `tracing::info!` calls for every step.
    pub include_logging: bool,
    /// Name of the generated module.
    pub module_name: String,
    /// Name of the generated struct.
    pub struct_name: String,
    /// Generate `async fn apply`.
    pub async_style: bool,
    /// Give the struct a private field so it can only be built through `new()`.
    pub sealed: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            include_comments: true,
            include_validation: true,
            include_logging: false,
            module_name: "preprocessing".to_string(),
            struct_name: "PreprocessingScript".to_string(),
            async_style: false,
            sealed: true,
        }
    }
}

/// Configuration for the incremental workflow.
///
/// Use [`IncrementalWorkflowConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use lex_incremental::config::IncrementalWorkflowConfig;
///
/// let config = IncrementalWorkflowConfig::builder()
///     .stage_ratios(0.01, 0.05, 0.1, 0.2)
///     .label_column("Churn")
///     .skip_hitl(true)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementalWorkflowConfig {
    /// Sample ratios for stages 1-4.
    pub stage_ratios: StageRatios,

    /// Confidence required to skip ahead after convergence and to auto-approve
    /// HITL rules.
    /// Default: 0.85
    pub min_confidence_threshold: f64,

    /// Maximum fraction of approved rules allowed to fail in bulk processing.
    /// Default: 0.1
    pub max_error_rate: f64,

    /// Resolve HITL rules with their recommended option instead of pausing.
    /// Default: false
    pub skip_hitl: bool,

    /// Approve HITL rules whose confidence meets the threshold.
    /// Default: false
    pub enable_auto_approval: bool,

    /// Whether to write the standalone transformation script.
    /// Default: true
    pub generate_scripts: bool,

    /// Whether to write the markdown report.
    /// Default: true
    pub generate_report: bool,

    /// Output directory for deliverables.
    /// Default: "output"
    pub output_dir: PathBuf,

    /// Seed for every random choice the workflow makes.
    /// Default: 42
    pub random_seed: u64,

    /// Mean relative difference under which two stages count as converged.
    /// Default: 0.01
    pub convergence_threshold: f64,

    /// Jump to bulk processing once converged and confident.
    /// Default: true
    pub allow_convergence_skip: bool,

    /// Keep applying rules after one fails.
    /// Default: true
    pub continue_on_failure: bool,

    pub sampling: SamplingConfig,
    pub analysis: AnalysisConfig,
    pub script: ScriptOptions,
}

impl Default for IncrementalWorkflowConfig {
    fn default() -> Self {
        Self {
            stage_ratios: StageRatios::default(),
            min_confidence_threshold: 0.85,
            max_error_rate: 0.1,
            skip_hitl: false,
            enable_auto_approval: false,
            generate_scripts: true,
            generate_report: true,
            output_dir: PathBuf::from("output"),
            random_seed: 42,
            convergence_threshold: 0.01,
            allow_convergence_skip: true,
            continue_on_failure: true,
            sampling: SamplingConfig::default(),
            analysis: AnalysisConfig::default(),
            script: ScriptOptions::default(),
        }
    }
}

impl IncrementalWorkflowConfig {
    /// Create a new configuration builder.
    pub fn builder() -> IncrementalWorkflowConfigBuilder {
        IncrementalWorkflowConfigBuilder::default()
    }

    /// Label column configured for stratification, if any.
    pub fn label_column(&self) -> Option<&str> {
        self.sampling.label_column.as_deref()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let ratios = self.stage_ratios.as_array();
        for (idx, ratio) in ratios.iter().enumerate() {
            if !(*ratio > 0.0 && *ratio <= 1.0) {
                return Err(ConfigValidationError::InvalidRatio {
                    stage: idx as u8 + 1,
                    value: *ratio,
                });
            }
        }
        for idx in 1..ratios.len() {
            if ratios[idx] < ratios[idx - 1] {
                return Err(ConfigValidationError::DecreasingRatios {
                    stage: idx as u8 + 1,
                    previous: ratios[idx - 1],
                    value: ratios[idx],
                });
            }
        }

        for (field, value) in [
            ("min_confidence_threshold", self.min_confidence_threshold),
            ("max_error_rate", self.max_error_rate),
            (
                "stratification_tolerance",
                self.sampling.stratification_tolerance,
            ),
            (
                "max_cardinality_ratio",
                self.sampling.adaptive.max_cardinality_ratio,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigValidationError::InvalidThreshold {
                    field: field.to_string(),
                    value,
                });
            }
        }

        if !(self.convergence_threshold > 0.0) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "convergence_threshold".to_string(),
                value: self.convergence_threshold,
            });
        }

        if self.sampling.min_sample_size == 0 {
            return Err(ConfigValidationError::InvalidMinSampleSize(
                self.sampling.min_sample_size,
            ));
        }

        if self.sampling.adaptive.min_classes > self.sampling.adaptive.max_classes {
            return Err(ConfigValidationError::InvalidClassRange {
                min: self.sampling.adaptive.min_classes,
                max: self.sampling.adaptive.max_classes,
            });
        }

        if self.sampling.strategy == Some(SamplingStrategyKind::Stratified)
            && self.sampling.label_column.is_none()
        {
            return Err(ConfigValidationError::MissingLabelColumn);
        }

        if self.script.struct_name.trim().is_empty() {
            return Err(ConfigValidationError::InvalidScriptName(
                self.script.struct_name.clone(),
            ));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid ratio for stage {stage}: {value} (must be in (0.0, 1.0])")]
    InvalidRatio { stage: u8, value: f64 },

    #[error("Stage {stage} ratio {value} is smaller than the previous stage's {previous}")]
    DecreasingRatios { stage: u8, previous: f64, value: f64 },

    #[error("Invalid threshold for '{field}': {value}")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid minimum sample size: {0} (must be at least 1)")]
    InvalidMinSampleSize(usize),

    #[error("Invalid adaptive class range: min {min} > max {max}")]
    InvalidClassRange { min: usize, max: usize },

    #[error("Stratified sampling requires a label column")]
    MissingLabelColumn,

    #[error("Invalid script struct name: '{0}'")]
    InvalidScriptName(String),
}

impl From<ConfigValidationError> for crate::error::IncrementalError {
    fn from(err: ConfigValidationError) -> Self {
        crate::error::IncrementalError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`IncrementalWorkflowConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct IncrementalWorkflowConfigBuilder {
    stage_ratios: Option<StageRatios>,
    min_confidence_threshold: Option<f64>,
    max_error_rate: Option<f64>,
    skip_hitl: Option<bool>,
    enable_auto_approval: Option<bool>,
    generate_scripts: Option<bool>,
    generate_report: Option<bool>,
    output_dir: Option<PathBuf>,
    label_column: Option<String>,
    random_seed: Option<u64>,
    convergence_threshold: Option<f64>,
    allow_convergence_skip: Option<bool>,
    continue_on_failure: Option<bool>,
    sampling_strategy: Option<SamplingStrategyKind>,
    stratification_tolerance: Option<f64>,
    min_sample_size: Option<usize>,
    adaptive: Option<AdaptiveThresholds>,
    analysis: Option<AnalysisConfig>,
    script: Option<ScriptOptions>,
}

impl IncrementalWorkflowConfigBuilder {
    /// Set the sample ratios for stages 1-4.
    pub fn stage_ratios(mut self, stage1: f64, stage2: f64, stage3: f64, stage4: f64) -> Self {
        self.stage_ratios = Some(StageRatios {
            stage1,
            stage2,
            stage3,
            stage4,
        });
        self
    }

    /// Set the confidence threshold used for convergence skips and auto-approval.
    pub fn min_confidence_threshold(mut self, threshold: f64) -> Self {
        self.min_confidence_threshold = Some(threshold);
        self
    }

    /// Set the maximum tolerated fraction of failing rules.
    pub fn max_error_rate(mut self, rate: f64) -> Self {
        self.max_error_rate = Some(rate);
        self
    }

    /// Resolve HITL rules through their recommended option.
    pub fn skip_hitl(mut self, skip: bool) -> Self {
        self.skip_hitl = Some(skip);
        self
    }

    /// Approve confident HITL rules without asking.
    pub fn enable_auto_approval(mut self, enable: bool) -> Self {
        self.enable_auto_approval = Some(enable);
        self
    }

    /// Enable or disable script generation.
    pub fn generate_scripts(mut self, generate: bool) -> Self {
        self.generate_scripts = Some(generate);
        self
    }

    /// Enable or disable the markdown report.
    pub fn generate_report(mut self, generate: bool) -> Self {
        self.generate_report = Some(generate);
        self
    }

    /// Set the output directory for deliverables.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Set the label column used for stratified sampling.
    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = Some(threshold);
        self
    }

    /// Allow or forbid jumping to bulk processing after convergence.
    pub fn allow_convergence_skip(mut self, allow: bool) -> Self {
        self.allow_convergence_skip = Some(allow);
        self
    }

    pub fn continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = Some(continue_on_failure);
        self
    }

    /// Force a sampling strategy instead of adaptive selection.
    pub fn sampling_strategy(mut self, strategy: SamplingStrategyKind) -> Self {
        self.sampling_strategy = Some(strategy);
        self
    }

    pub fn stratification_tolerance(mut self, tolerance: f64) -> Self {
        self.stratification_tolerance = Some(tolerance);
        self
    }

    /// Set the minimum number of rows per stage sample.
    pub fn min_sample_size(mut self, size: usize) -> Self {
        self.min_sample_size = Some(size);
        self
    }

    pub fn adaptive_thresholds(mut self, thresholds: AdaptiveThresholds) -> Self {
        self.adaptive = Some(thresholds);
        self
    }

    pub fn analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn script_options(mut self, options: ScriptOptions) -> Self {
        self.script = Some(options);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `IncrementalWorkflowConfig` or an error if validation fails.
    pub fn build(self) -> Result<IncrementalWorkflowConfig, ConfigValidationError> {
        let defaults = SamplingConfig::default();
        let config = IncrementalWorkflowConfig {
            stage_ratios: self.stage_ratios.unwrap_or_default(),
            min_confidence_threshold: self.min_confidence_threshold.unwrap_or(0.85),
            max_error_rate: self.max_error_rate.unwrap_or(0.1),
            skip_hitl: self.skip_hitl.unwrap_or(false),
            enable_auto_approval: self.enable_auto_approval.unwrap_or(false),
            generate_scripts: self.generate_scripts.unwrap_or(true),
            generate_report: self.generate_report.unwrap_or(true),
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("output")),
            random_seed: self.random_seed.unwrap_or(42),
            convergence_threshold: self.convergence_threshold.unwrap_or(0.01),
            allow_convergence_skip: self.allow_convergence_skip.unwrap_or(true),
            continue_on_failure: self.continue_on_failure.unwrap_or(true),
            sampling: SamplingConfig {
                strategy: self.sampling_strategy,
                label_column: self.label_column,
                stratification_tolerance: self
                    .stratification_tolerance
                    .unwrap_or(defaults.stratification_tolerance),
                min_sample_size: self.min_sample_size.unwrap_or(defaults.min_sample_size),
                adaptive: self.adaptive.unwrap_or_default(),
            },
            analysis: self.analysis.unwrap_or_default(),
            script: self.script.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
