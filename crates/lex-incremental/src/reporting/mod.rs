//! Deliverable generation.
//!
//! A completed session produces:
//! - `cleaned_data.csv`: the full dataset after all approved rules
//! - `preprocessing_script.rs`: a standalone replay of the approved rules
//!   (only when rules were approved and script generation is enabled)
//! - `report.md`: a human-readable summary (when enabled)
//! - `metadata.json`: the machine-readable session record
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_incremental::reporting::DeliverableGenerator;
//!
//! let manifest = DeliverableGenerator::generate_all(&state, &mut cleaned, Path::new("output"))?;
//! println!("{}", manifest.cleaned_data.display());
//! ```

mod generator;

pub use generator::{
    CLEANED_DATA_FILE, DeliverableGenerator, METADATA_FILE, REPORT_FILE, RuleSummary,
    SCRIPT_FILE, StageSummary, WorkflowMetadata,
};
