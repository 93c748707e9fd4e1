//! Workflow orchestration.
//!
//! A session moves through four sampling stages, pausing whenever a rule
//! needs a human decision, then applies the approved rules to the full
//! dataset and writes the deliverables. State is checkpointed at every
//! stage boundary so a paused or cancelled session can be resumed.

pub mod checkpoint;
mod orchestrator;
pub mod progress;
pub mod state;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use orchestrator::{
    CHECKPOINT_DIR, IncrementalWorkflow, IncrementalWorkflowBuilder, load_dataset,
};
pub use progress::{
    CancellationToken, ClosureProgressReporter, ProgressReporter, WorkflowProgress, WorkflowStage,
};
pub use state::{StageResult, WorkflowOutcome, WorkflowState, WorkflowStatus, workflow_confidence};
