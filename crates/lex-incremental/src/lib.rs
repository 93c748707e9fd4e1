//! Incremental Preprocessing Library
//!
//! Discovers and applies data-cleaning rules on large tables through
//! progressive sampling, statistical analysis and optional human review,
//! touching the full dataset only once the rules are trusted. Built with
//! Rust and Polars.
//!
//! # Overview
//!
//! - **Sampling**: random, stratified and adaptive strategies with a minimum
//!   sample size and distribution checks
//! - **Analysis**: per-column statistics, quality issues, structural patterns
//!   and convergence between stages
//! - **Rule Discovery**: candidate rules with confidence and a review flag,
//!   merged across stages
//! - **Human-in-the-Loop**: questions, answers and an audit log of every
//!   decision
//! - **Rule Application**: all-or-nothing per rule, failures recorded as values
//! - **Deliverables**: cleaned CSV, a replayable Rust script, a markdown
//!   report and JSON metadata
//! - **Progress Reporting**: stage updates, cancellation and checkpoints
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lex_incremental::{IncrementalWorkflow, IncrementalWorkflowConfig, WorkflowOutcome};
//!
//! let config = IncrementalWorkflowConfig::builder()
//!     .output_dir("output")
//!     .min_confidence_threshold(0.9)
//!     .build()?;
//!
//! let workflow = IncrementalWorkflow::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?;
//!
//! let mut outcome = workflow.start("data.csv")?;
//! while let WorkflowOutcome::AwaitingInput { state, questions } = outcome {
//!     let answers = present_to_reviewer(&questions);
//!     outcome = workflow.resume(&state.session_id, &answers)?;
//! }
//! ```
//!
//! # Without a reviewer
//!
//! With `skip_hitl` every question is answered with its recommended option
//! and the session runs straight through. `enable_auto_approval` does the
//! same only for rules whose confidence reaches `min_confidence_threshold`.

pub mod analysis;
pub mod applier;
pub mod config;
pub mod discovery;
pub mod error;
pub mod hitl;
pub mod reporting;
pub mod sampling;
pub mod script;
pub mod types;
pub mod utils;
pub mod workflow;

// Re-exports for convenient access
pub use analysis::{ConvergenceReport, QualityAnalyzer, SampleAnalyzer, check_convergence};
pub use applier::{apply_rule, apply_rules, execution_plan, validate_rule};
pub use config::{
    AdaptiveThresholds, AnalysisConfig, ConfigValidationError, IncrementalWorkflowConfig,
    IncrementalWorkflowConfigBuilder, SamplingConfig, SamplingStrategyKind, ScriptOptions,
    StageRatios,
};
pub use discovery::{MergeSummary, RuleDiscovery, merge_rules};
pub use error::{IncrementalError, Result as IncrementalResult, ResultExt};
pub use hitl::{
    DecisionLog, DecisionStatistics, HITLAnswer, HITLDecisionLog, HITLQuestion, QuestionGenerator,
};
pub use reporting::DeliverableGenerator;
pub use sampling::{SampleOutcome, SamplingEngine};
pub use script::ScriptGenerator;
pub use types::{
    ApprovalState, ColumnAnalysis, ColumnDataType, DeliverableManifest, HitlAction,
    PreprocessingRule, RuleApplicationBatchResult, RuleApplicationResult, RuleType,
    SampleAnalysis,
};
pub use workflow::{
    CancellationToken, CheckpointStore, ClosureProgressReporter, FileCheckpointStore,
    InMemoryCheckpointStore, IncrementalWorkflow, IncrementalWorkflowBuilder, ProgressReporter,
    WorkflowOutcome, WorkflowProgress, WorkflowStage, WorkflowState, WorkflowStatus,
};
