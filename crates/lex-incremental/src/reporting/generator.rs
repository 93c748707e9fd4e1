use crate::config::IncrementalWorkflowConfig;
use crate::error::{IncrementalError, Result, ResultExt};
use crate::hitl::DecisionStatistics;
use crate::script::ScriptGenerator;
use crate::types::{ApprovalState, DeliverableManifest, HitlAction, PreprocessingRule, RuleType};
use crate::workflow::progress::WorkflowStage;
use crate::workflow::state::WorkflowState;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CLEANED_DATA_FILE: &str = "cleaned_data.csv";
pub const SCRIPT_FILE: &str = "preprocessing_script.rs";
pub const REPORT_FILE: &str = "report.md";
pub const METADATA_FILE: &str = "metadata.json";

// ============================================================================
// Metadata Types
// ============================================================================

/// Per-stage summary written to `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: u8,
    pub name: String,
    pub sample_size: usize,
    pub sample_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub rules_discovered: usize,
    pub quality_score: f64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Rule entry written to `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub id: String,
    pub rule_type: RuleType,
    pub columns: Vec<String>,
    pub description: String,
    pub action: HitlAction,
    pub approval: ApprovalState,
    pub confidence: f64,
    pub requires_hitl: bool,
    pub discovered_in_stage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
}

impl From<&PreprocessingRule> for RuleSummary {
    fn from(rule: &PreprocessingRule) -> Self {
        Self {
            id: rule.id.clone(),
            rule_type: rule.rule_type,
            columns: rule.columns.clone(),
            description: rule.description.clone(),
            action: rule.action,
            approval: rule.approval,
            confidence: rule.confidence,
            requires_hitl: rule.requires_hitl,
            discovered_in_stage: rule.discovered_in_stage,
            user_feedback: rule.user_feedback.clone(),
        }
    }
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub session_id: String,
    pub stage: WorkflowStage,
    pub dataset_path: PathBuf,
    pub total_records: usize,
    pub total_duration_ms: u64,
    pub confidence: f64,
    pub converged: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub skipped_stages: Vec<u8>,
    pub stages: Vec<StageSummary>,
    pub rules: Vec<RuleSummary>,
    pub decision_statistics: DecisionStatistics,
    pub config: IncrementalWorkflowConfig,
}

impl WorkflowMetadata {
    pub fn from_state(state: &WorkflowState) -> Self {
        let stages = state
            .stage_results
            .values()
            .map(|result| StageSummary {
                stage: result.stage,
                name: WorkflowStage::from_number(result.stage)
                    .map(|s| s.display_name().to_string())
                    .unwrap_or_default(),
                sample_size: result.sample_size,
                sample_ratio: result.sample_ratio,
                strategy: result.strategy.map(|s| s.as_str().to_string()),
                rules_discovered: result.rules_discovered.len(),
                quality_score: result.analysis.quality_score,
                duration_ms: result.duration_ms,
                notes: result.notes.clone(),
            })
            .collect();

        Self {
            session_id: state.session_id.clone(),
            stage: state.current_stage,
            dataset_path: state.dataset_path.clone(),
            total_records: state.total_records,
            total_duration_ms: state.total_duration_ms(),
            confidence: state.confidence,
            converged: state.converged,
            started_at: state.started_at,
            completed_at: state.completed_at,
            skipped_stages: state.skipped_stages.clone(),
            stages,
            rules: state.discovered_rules.iter().map(RuleSummary::from).collect(),
            decision_statistics: state.decision_log.statistics(),
            config: state.config.clone(),
        }
    }
}

// ============================================================================
// Deliverable Generator
// ============================================================================

/// Writes the files produced at the end of a session.
#[derive(Debug, Clone, Default)]
pub struct DeliverableGenerator;

impl DeliverableGenerator {
    /// Write every deliverable the configuration asks for into `output_dir`.
    pub fn generate_all(
        state: &WorkflowState,
        cleaned: &mut DataFrame,
        output_dir: &Path,
    ) -> Result<DeliverableManifest> {
        fs::create_dir_all(output_dir)
            .context(format!("Failed to create {}", output_dir.display()))?;

        let cleaned_path = output_dir.join(CLEANED_DATA_FILE);
        Self::write_csv(cleaned, &cleaned_path)?;

        let script = if state.config.generate_scripts && !state.approved_rules.is_empty() {
            let path = output_dir.join(SCRIPT_FILE);
            ScriptGenerator::new(state.config.script.clone())
                .generate_and_save(&state.approved_rules, &path)?;
            Some(path)
        } else {
            None
        };

        let metadata_path = output_dir.join(METADATA_FILE);
        let report = if state.config.generate_report {
            let path = output_dir.join(REPORT_FILE);
            let deliverables = [
                Some(cleaned_path.as_path()),
                script.as_deref(),
                Some(path.as_path()),
                Some(metadata_path.as_path()),
            ];
            let markdown = Self::render_report(state, cleaned, &deliverables)?;
            fs::write(&path, markdown).context(format!("Failed to write {}", path.display()))?;
            info!("Report saved: {}", path.display());
            Some(path)
        } else {
            None
        };

        let metadata = WorkflowMetadata::from_state(state);
        let json = serde_json::to_string_pretty(&metadata)?;
        fs::write(&metadata_path, json)
            .context(format!("Failed to write {}", metadata_path.display()))?;
        info!("Metadata saved: {}", metadata_path.display());

        Ok(DeliverableManifest {
            cleaned_data: cleaned_path,
            script,
            report,
            metadata: metadata_path,
            generated_at: Utc::now(),
        })
    }

    fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
        let mut file = File::create(path).context(format!("Failed to create {}", path.display()))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(df)
            .context(format!("Failed to write {}", path.display()))?;
        info!("Dataset saved: {}", path.display());
        Ok(())
    }

    /// Markdown report for a session.
    pub fn render_report(
        state: &WorkflowState,
        cleaned: &DataFrame,
        deliverables: &[Option<&Path>],
    ) -> Result<String> {
        let failed = |e: std::fmt::Error| IncrementalError::ReportGenerationFailed(e.to_string());
        let mut md = String::new();
        Self::write_report(&mut md, state, cleaned, deliverables).map_err(failed)?;

        let config = serde_json::to_string_pretty(&state.config)?;
        writeln!(md, "## Configuration\n\n```json\n{config}\n```").map_err(failed)?;
        Ok(md)
    }

    fn write_report(
        md: &mut String,
        state: &WorkflowState,
        cleaned: &DataFrame,
        deliverables: &[Option<&Path>],
    ) -> std::fmt::Result {
        writeln!(md, "# Incremental Preprocessing Report\n")?;
        writeln!(md, "- **Session:** `{}`", state.session_id)?;
        writeln!(md, "- **Dataset:** `{}`", state.dataset_path.display())?;
        writeln!(md, "- **Started:** {}", state.started_at.to_rfc3339())?;
        if let Some(completed) = state.completed_at {
            writeln!(md, "- **Completed:** {}", completed.to_rfc3339())?;
        }
        writeln!(md, "- **Stage:** {}\n", state.current_stage.display_name())?;

        let rejected = state
            .discovered_rules
            .iter()
            .filter(|r| r.approval == ApprovalState::Rejected)
            .count();
        let stats = state.decision_log.statistics();
        writeln!(md, "## Summary\n")?;
        writeln!(md, "| Metric | Value |")?;
        writeln!(md, "|---|---|")?;
        writeln!(md, "| Total records | {} |", state.total_records)?;
        writeln!(md, "| Cleaned shape | {} x {} |", cleaned.height(), cleaned.width())?;
        writeln!(md, "| Rules discovered | {} |", state.discovered_rules.len())?;
        writeln!(md, "| Rules approved | {} |", state.approved_rules.len())?;
        writeln!(md, "| Rules rejected | {rejected} |")?;
        writeln!(md, "| Confidence | {:.3} |", state.confidence)?;
        writeln!(md, "| Converged | {} |", if state.converged { "yes" } else { "no" })?;
        if !state.skipped_stages.is_empty() {
            let skipped: Vec<String> = state.skipped_stages.iter().map(u8::to_string).collect();
            writeln!(md, "| Skipped stages | {} |", skipped.join(", "))?;
        }
        writeln!(
            md,
            "| HITL decisions | {} ({} automated) |",
            stats.total_decisions, stats.automated_decisions
        )?;
        writeln!(md, "| Duration | {} ms |\n", state.total_duration_ms())?;

        writeln!(md, "## Rules\n")?;
        if state.discovered_rules.is_empty() {
            writeln!(md, "No rules were discovered.\n")?;
        } else {
            writeln!(md, "| | Rule | Action | Confidence | Stage | Description |")?;
            writeln!(md, "|---|---|---|---|---|---|")?;
            for rule in &state.discovered_rules {
                let mark = match rule.approval {
                    ApprovalState::Approved => "✅",
                    ApprovalState::Rejected => "❌",
                    ApprovalState::Pending => "⏳",
                };
                writeln!(
                    md,
                    "| {mark} | `{}` | {} | {:.2} | {} | {} |",
                    rule.id,
                    rule.action.as_str(),
                    rule.confidence,
                    rule.discovered_in_stage,
                    rule.description.replace('|', "\\|")
                )?;
            }
            writeln!(md)?;
        }

        writeln!(md, "## Stages\n")?;
        for result in state.stage_results.values() {
            let name = WorkflowStage::from_number(result.stage)
                .map(|s| s.display_name())
                .unwrap_or("Unknown");
            writeln!(md, "### Stage {}: {name}\n", result.stage)?;
            writeln!(
                md,
                "- Sample: {} rows (ratio {:.4}, requested {:.4})",
                result.sample_size, result.sample_ratio, result.requested_ratio
            )?;
            if let Some(strategy) = result.strategy {
                writeln!(md, "- Strategy: {}", strategy.as_str())?;
            }
            writeln!(md, "- Quality score: {:.3}", result.analysis.quality_score)?;
            writeln!(md, "- Issues found: {}", result.analysis.issue_count())?;
            writeln!(md, "- Rules discovered: {}", result.rules_discovered.len())?;
            writeln!(md, "- Duration: {} ms", result.duration_ms)?;
            for note in &result.notes {
                writeln!(md, "- Note: {note}")?;
            }
            writeln!(md)?;
        }

        writeln!(md, "## Deliverables\n")?;
        for path in deliverables.iter().flatten() {
            writeln!(md, "- `{}`", path.display())?;
        }
        writeln!(md)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleAnalysis;
    use crate::workflow::state::StageResult;

    fn completed_state(generate_report: bool) -> WorkflowState {
        let config = IncrementalWorkflowConfig {
            generate_report,
            ..Default::default()
        };
        let mut state = WorkflowState::new("data.csv", 3, config);
        let mut rule = PreprocessingRule::new(
            RuleType::MissingValueStrategy,
            vec!["age".to_string()],
            "missing_values",
            "Fill 'age' | median",
            HitlAction::ImputeMedian,
            1,
        );
        rule.approval = ApprovalState::Approved;
        state.discovered_rules = vec![rule];
        state.sync_approved();
        state.stage_results.insert(
            1,
            StageResult {
                stage: 1,
                sample_size: 3,
                requested_ratio: 0.01,
                sample_ratio: 1.0,
                strategy: Some(crate::config::SamplingStrategyKind::Random),
                analysis: SampleAnalysis {
                    stage: 1,
                    sample_ratio: 1.0,
                    row_count: 3,
                    column_count: 1,
                    columns: Vec::new(),
                    quality_score: 0.9,
                    estimated_memory_bytes: 0,
                },
                rules_discovered: state.discovered_rules.clone(),
                duration_ms: 5,
                notes: vec!["sample raised to the minimum size".to_string()],
            },
        );
        state.current_stage = WorkflowStage::Completed;
        state.completed_at = Some(Utc::now());
        state
    }

    #[test]
    fn test_generate_all_writes_deliverables() {
        let dir = tempfile::tempdir().unwrap();
        let state = completed_state(true);
        let mut cleaned = df! { "age" => [1.0, 2.0, 3.0] }.unwrap();

        let manifest = DeliverableGenerator::generate_all(&state, &mut cleaned, dir.path()).unwrap();
        assert!(manifest.cleaned_data.exists());
        assert!(manifest.metadata.exists());
        assert!(manifest.script.as_ref().unwrap().exists());
        let report = fs::read_to_string(manifest.report.as_ref().unwrap()).unwrap();
        assert!(report.contains("# Incremental Preprocessing Report"));
        assert!(report.contains("`missing_value_strategy:age`"));
        assert!(report.contains("Fill 'age' \\| median"));
        assert!(report.contains("Note: sample raised"));
        assert!(report.contains("```json"));

        let metadata: WorkflowMetadata =
            serde_json::from_str(&fs::read_to_string(&manifest.metadata).unwrap()).unwrap();
        assert_eq!(metadata.session_id, state.session_id);
        assert_eq!(metadata.rules.len(), 1);
        assert_eq!(metadata.stages.len(), 1);
        assert_eq!(metadata.stages[0].strategy.as_deref(), Some("random"));
    }

    #[test]
    fn test_optional_deliverables_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = completed_state(false);
        state.approved_rules.clear();
        let mut cleaned = df! { "age" => [1.0] }.unwrap();

        let manifest = DeliverableGenerator::generate_all(&state, &mut cleaned, dir.path()).unwrap();
        assert!(manifest.script.is_none());
        assert!(manifest.report.is_none());
        assert!(!dir.path().join(REPORT_FILE).exists());
        assert!(manifest.metadata.exists());
    }
}
