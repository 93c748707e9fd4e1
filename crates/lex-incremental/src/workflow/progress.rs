//! Progress reporting and cancellation support for the incremental workflow.
//!
//! This module provides the workflow's stage machine states, the progress
//! updates emitted while a session runs, and a token for cancelling a session
//! from another thread (e.g. a UI cancel button).
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_incremental::{IncrementalWorkflow, CancellationToken};
//!
//! let token = CancellationToken::new();
//! let token_clone = token.clone();
//!
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!     token_clone.cancel();
//! });
//!
//! let outcome = IncrementalWorkflow::builder()
//!     .cancellation_token(token)
//!     .on_progress(|update| {
//!         println!("[{:?}] {}", update.stage, update.message);
//!     })
//!     .build()?
//!     .start("data.csv");
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// States of the five-stage workflow.
///
/// Stages 1-4 work on growing samples; bulk processing works on the full
/// dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    NotStarted,
    /// Stage 1: first small sample
    InitialExploration,
    /// Stage 2: larger sample to expand the discovered patterns
    PatternExpansion,
    /// Stage 3: sample on which ambiguous rules are put to a human
    HitlDecision,
    /// Stage 4: last sample before the full run
    ConfidenceCheckpoint,
    /// Stage 5: apply approved rules to the full dataset
    BulkProcessing,
    Completed,
}

impl WorkflowStage {
    /// Stage number 1-5, or `None` before start and after completion.
    pub fn number(&self) -> Option<u8> {
        match self {
            Self::InitialExploration => Some(1),
            Self::PatternExpansion => Some(2),
            Self::HitlDecision => Some(3),
            Self::ConfidenceCheckpoint => Some(4),
            Self::BulkProcessing => Some(5),
            Self::NotStarted | Self::Completed => None,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::InitialExploration),
            2 => Some(Self::PatternExpansion),
            3 => Some(Self::HitlDecision),
            4 => Some(Self::ConfidenceCheckpoint),
            5 => Some(Self::BulkProcessing),
            _ => None,
        }
    }

    /// Whether the stage works on a sample rather than the full dataset.
    pub fn is_sampling(&self) -> bool {
        matches!(self.number(), Some(1..=4))
    }

    /// The stage that follows in the normal (non-skipping) order.
    pub fn next(&self) -> Self {
        match self {
            Self::NotStarted => Self::InitialExploration,
            Self::InitialExploration => Self::PatternExpansion,
            Self::PatternExpansion => Self::HitlDecision,
            Self::HitlDecision => Self::ConfidenceCheckpoint,
            Self::ConfidenceCheckpoint => Self::BulkProcessing,
            Self::BulkProcessing | Self::Completed => Self::Completed,
        }
    }

    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InitialExploration => "Initial Exploration",
            Self::PatternExpansion => "Pattern Expansion",
            Self::HitlDecision => "HITL Decision",
            Self::ConfidenceCheckpoint => "Confidence Checkpoint",
            Self::BulkProcessing => "Bulk Processing",
            Self::Completed => "Completed",
        }
    }

    /// Returns the typical weight of this stage in the overall workflow (0.0 - 1.0).
    pub fn weight(&self) -> f32 {
        match self {
            Self::NotStarted => 0.0,
            Self::InitialExploration => 0.10,
            Self::PatternExpansion => 0.15,
            Self::HitlDecision => 0.15,
            Self::ConfidenceCheckpoint => 0.20,
            Self::BulkProcessing => 0.40,
            Self::Completed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::NotStarted => 0.0,
            Self::InitialExploration => 0.0,
            Self::PatternExpansion => 0.10,
            Self::HitlDecision => 0.25,
            Self::ConfidenceCheckpoint => 0.40,
            Self::BulkProcessing => 0.60,
            Self::Completed => 1.0,
        }
    }
}

/// Progress update emitted while a session runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowProgress {
    /// Current workflow stage
    pub stage: WorkflowStage,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    /// Human-readable message describing current activity
    pub message: String,

    /// Rules discovered so far in the session
    pub rules_discovered: usize,

    /// Current workflow confidence (0.0 - 1.0)
    pub confidence: f64,

    /// Whether the last two stages converged
    pub converged: bool,

    /// Number of items processed in current stage (for iterative operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    /// Total items in current stage (for iterative operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl WorkflowProgress {
    /// Creates a new progress update for a stage.
    pub fn new(stage: WorkflowStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            rules_discovered: 0,
            confidence: 0.0,
            converged: false,
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a new progress update with item counts.
    pub fn with_items(
        stage: WorkflowStage,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        let mut update = Self::new(stage, stage_progress, message);
        update.items_processed = Some(current);
        update.items_total = Some(total);
        update
    }

    /// Attach the session's rule count, confidence and convergence flag.
    pub fn with_metrics(mut self, rules_discovered: usize, confidence: f64, converged: bool) -> Self {
        self.rules_discovered = rules_discovered;
        self.confidence = confidence;
        self.converged = converged;
        self
    }

    /// Creates a completion progress update.
    pub fn complete(message: impl Into<String>) -> Self {
        let mut update = Self::new(WorkflowStage::Completed, 1.0, message);
        update.progress = 1.0;
        update
    }
}

/// Trait for receiving progress updates from the workflow.
///
/// Implementations must be `Send + Sync` so a session can run on a
/// background thread while updates are delivered elsewhere.
pub trait ProgressReporter: Send + Sync {
    /// Called at stage boundaries and once per rule during bulk processing.
    /// Implementations should be efficient and non-blocking.
    fn report(&self, update: WorkflowProgress);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(WorkflowProgress) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(WorkflowProgress) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(WorkflowProgress) + Send + Sync,
{
    fn report(&self, update: WorkflowProgress) {
        (self.callback)(update);
    }
}

/// Token for cancelling a running session.
///
/// This token uses an atomic boolean internally, making it safe to clone
/// and share across threads. The workflow checks it at stage boundaries,
/// before each analysed column and before each applied rule, and returns
/// [`IncrementalError::Cancelled`](crate::error::IncrementalError::Cancelled)
/// once cancellation is requested. The last checkpoint stays the resume point.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(WorkflowProgress: Send, Sync);

impl CancellationToken {
    /// Creates a new cancellation token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if [`cancel()`](Self::cancel) has been called on this
    /// token or any of its clones.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another session.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cancellation_token_clone_shares_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();
        assert!(!token2.is_cancelled());

        token1.cancel();
        assert!(token2.is_cancelled());

        token2.reset();
        assert!(!token1.is_cancelled());
    }

    #[test]
    fn test_stage_numbers_round_trip() {
        for n in 1..=5 {
            let stage = WorkflowStage::from_number(n).unwrap();
            assert_eq!(stage.number(), Some(n));
        }
        assert_eq!(WorkflowStage::from_number(0), None);
        assert_eq!(WorkflowStage::Completed.number(), None);
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(
            WorkflowStage::NotStarted.next(),
            WorkflowStage::InitialExploration
        );
        assert_eq!(
            WorkflowStage::ConfidenceCheckpoint.next(),
            WorkflowStage::BulkProcessing
        );
        assert_eq!(WorkflowStage::BulkProcessing.next(), WorkflowStage::Completed);
        assert!(WorkflowStage::HitlDecision.is_sampling());
        assert!(!WorkflowStage::BulkProcessing.is_sampling());
    }

    #[test]
    fn test_stage_weights_sum() {
        let total: f32 = (1..=5)
            .filter_map(WorkflowStage::from_number)
            .map(|s| s.weight())
            .sum();
        assert!((total - 1.0).abs() < 0.01, "Weights should sum to ~1.0");
    }

    #[test]
    fn test_progress_with_items() {
        let update = WorkflowProgress::with_items(WorkflowStage::BulkProcessing, 1, 4, "rule 1")
            .with_metrics(7, 0.9, true);
        assert_eq!(update.stage_progress, 0.25);
        assert!((update.progress - 0.70).abs() < 1e-6);
        assert_eq!(update.rules_discovered, 7);
        assert!(update.converged);
    }

    #[test]
    fn test_stage_json_values() {
        let json = serde_json::to_string(&WorkflowStage::HitlDecision).unwrap();
        assert_eq!(json, "\"hitl_decision\"");
        let update = WorkflowProgress::complete("done");
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"stage\":\"completed\""));
        assert!(!json.contains("items_total"));
    }

    #[test]
    fn test_progress_reporter_across_threads() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let reporter = Arc::new(ClosureProgressReporter::new(move |_update| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let reporter_clone = reporter.clone();
        let handle = std::thread::spawn(move || {
            reporter_clone.report(WorkflowProgress::new(
                WorkflowStage::InitialExploration,
                0.5,
                "Sampling",
            ));
        });

        handle.join().expect("Thread should not panic");
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
