//! Custom error types for the incremental preprocessing workflow.
//!
//! Errors are grouped the way the workflow treats them: per-rule failures never
//! surface here (they are recorded in [`RuleApplicationResult`]), while
//! sampling, cancellation and checkpoint failures are raised to the caller.
//!
//! Errors are serializable so a front end can display them with a stable code.
//!
//! [`RuleApplicationResult`]: crate::types::RuleApplicationResult

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the incremental workflow.
#[derive(Error, Debug)]
pub enum IncrementalError {
    /// Workflow was cancelled through its cancellation token.
    #[error("Workflow cancelled")]
    Cancelled,

    /// An argument was outside its valid domain (e.g. a sample ratio).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A HITL answer did not match its question.
    #[error("Invalid answer for question '{question_id}': {reason}")]
    InvalidAnswer { question_id: String, reason: String },

    /// The workflow is not in a state that allows the requested operation.
    #[error("Invalid workflow state: {0}")]
    InvalidState(String),

    /// Checkpoint could not be read or written.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Sample analysis failed.
    #[error("Failed to analyze sample: {0}")]
    AnalysisFailed(String),

    /// Too many rules failed during bulk processing.
    #[error("Rule failure rate {rate:.3} exceeds the tolerated maximum {max:.3}")]
    ErrorRateExceeded { rate: f64, max: f64 },

    /// Deliverable generation failed.
    #[error("Failed to generate deliverables: {0}")]
    ReportGenerationFailed(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<IncrementalError>,
    },
}

impl IncrementalError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        IncrementalError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for front-end handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidAnswer { .. } => "INVALID_ANSWER",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Checkpoint(_) => "CHECKPOINT_ERROR",
            Self::AnalysisFailed(_) => "ANALYSIS_FAILED",
            Self::ErrorRateExceeded { .. } => "ERROR_RATE_EXCEEDED",
            Self::ReportGenerationFailed(_) => "REPORT_GENERATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Check if the caller can retry after fixing input (answers, config, arguments).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::InvalidArgument(_)
                | Self::InvalidConfig(_)
                | Self::InvalidAnswer { .. }
        )
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for IncrementalError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("IncrementalError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for workflow operations.
pub type Result<T> = std::result::Result<T, IncrementalError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| IncrementalError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| IncrementalError::Io(e).with_context(context))
    }
}
