//! Persistent session state.

use super::progress::WorkflowStage;
use crate::analysis::ConvergenceReport;
use crate::config::{IncrementalWorkflowConfig, SamplingStrategyKind};
use crate::hitl::{DecisionLog, HITLQuestion};
use crate::types::{
    ApprovalState, DeliverableManifest, PreprocessingRule, RuleApplicationBatchResult,
    SampleAnalysis,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    /// Paused until the pending questions are answered.
    AwaitingInput,
    Completed,
}

/// Record of one finished stage. Never modified once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: u8,
    pub sample_size: usize,
    pub requested_ratio: f64,
    /// Ratio after the minimum sample size was enforced.
    pub sample_ratio: f64,
    /// `None` for bulk processing, which reads the full dataset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SamplingStrategyKind>,
    pub analysis: SampleAnalysis,
    pub rules_discovered: Vec<PreprocessingRule>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Everything needed to report on or resume a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub session_id: String,
    pub current_stage: WorkflowStage,
    pub dataset_path: PathBuf,
    pub total_records: usize,
    pub stage_results: BTreeMap<u8, StageResult>,
    pub discovered_rules: Vec<PreprocessingRule>,
    /// Approved subset of `discovered_rules`.
    pub approved_rules: Vec<PreprocessingRule>,
    pub confidence: f64,
    pub converged: bool,
    pub config: IncrementalWorkflowConfig,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub pending_questions: Vec<HITLQuestion>,
    #[serde(default)]
    pub decision_log: DecisionLog,
    /// Sampling stages jumped over after early convergence.
    #[serde(default)]
    pub skipped_stages: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_convergence: Option<ConvergenceReport>,
}

impl WorkflowState {
    pub fn new(
        dataset_path: impl Into<PathBuf>,
        total_records: usize,
        config: IncrementalWorkflowConfig,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            current_stage: WorkflowStage::NotStarted,
            dataset_path: dataset_path.into(),
            total_records,
            stage_results: BTreeMap::new(),
            discovered_rules: Vec::new(),
            approved_rules: Vec::new(),
            confidence: 0.0,
            converged: false,
            config,
            started_at: Utc::now(),
            completed_at: None,
            status: WorkflowStatus::Running,
            pending_questions: Vec::new(),
            decision_log: DecisionLog::default(),
            skipped_stages: Vec::new(),
            last_convergence: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    pub fn rule_mut(&mut self, id: &str) -> Option<&mut PreprocessingRule> {
        self.discovered_rules.iter_mut().find(|r| r.id == id)
    }

    /// Rebuild `approved_rules` from the discovered rules.
    pub fn sync_approved(&mut self) {
        self.approved_rules = self
            .discovered_rules
            .iter()
            .filter(|r| r.is_approved())
            .cloned()
            .collect();
    }

    pub fn refresh_confidence(&mut self) {
        self.confidence = workflow_confidence(&self.discovered_rules);
    }

    pub fn total_duration_ms(&self) -> u64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}

/// Mean confidence of the rules that were not rejected, 1.0 when there are none.
pub fn workflow_confidence(rules: &[PreprocessingRule]) -> f64 {
    let active: Vec<f64> = rules
        .iter()
        .filter(|r| r.approval != ApprovalState::Rejected)
        .map(|r| r.confidence)
        .collect();
    if active.is_empty() {
        1.0
    } else {
        active.iter().sum::<f64>() / active.len() as f64
    }
}

/// How a call to the workflow ended.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    /// Every stage ran and the deliverables were written.
    Completed {
        state: Box<WorkflowState>,
        manifest: DeliverableManifest,
        batch: RuleApplicationBatchResult,
    },
    /// The session is paused; answer `questions` and resume.
    AwaitingInput {
        state: Box<WorkflowState>,
        questions: Vec<HITLQuestion>,
    },
}

impl WorkflowOutcome {
    pub fn state(&self) -> &WorkflowState {
        match self {
            Self::Completed { state, .. } | Self::AwaitingInput { state, .. } => state,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Pending questions; empty for a completed session.
    pub fn questions(&self) -> &[HITLQuestion] {
        match self {
            Self::AwaitingInput { questions, .. } => questions,
            Self::Completed { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HitlAction, RuleType};

    fn rule(column: &str, confidence: f64, approval: ApprovalState) -> PreprocessingRule {
        let mut rule = PreprocessingRule::new(
            RuleType::MissingValueStrategy,
            vec![column.to_string()],
            "missing_values",
            "",
            HitlAction::ImputeMedian,
            1,
        )
        .with_confidence(confidence);
        rule.approval = approval;
        rule
    }

    #[test]
    fn test_workflow_confidence_ignores_rejected() {
        assert_eq!(workflow_confidence(&[]), 1.0);
        let rules = vec![
            rule("a", 0.8, ApprovalState::Approved),
            rule("b", 0.6, ApprovalState::Pending),
            rule("c", 0.1, ApprovalState::Rejected),
        ];
        assert!((workflow_confidence(&rules) - 0.7).abs() < 1e-12);
        assert_eq!(workflow_confidence(&rules[2..]), 1.0);
    }

    #[test]
    fn test_sync_approved_is_subset() {
        let mut state = WorkflowState::new("data.csv", 10, IncrementalWorkflowConfig::default());
        state.discovered_rules = vec![
            rule("a", 0.9, ApprovalState::Approved),
            rule("b", 0.9, ApprovalState::Pending),
        ];
        state.sync_approved();
        assert_eq!(state.approved_rules.len(), 1);
        assert!(
            state
                .approved_rules
                .iter()
                .all(|a| state.discovered_rules.iter().any(|d| d.id == a.id))
        );
    }

    #[test]
    fn test_state_serializes() {
        let state = WorkflowState::new("data.csv", 10, IncrementalWorkflowConfig::default());
        let json = serde_json::to_string(&state).unwrap();
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, state.session_id);
        assert_eq!(back.status, WorkflowStatus::Running);
        assert_eq!(back.current_stage, WorkflowStage::NotStarted);
    }
}
