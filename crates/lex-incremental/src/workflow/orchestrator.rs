//! The five-stage workflow state machine.

use super::checkpoint::{CheckpointStore, FileCheckpointStore};
use super::progress::{
    CancellationToken, ClosureProgressReporter, ProgressReporter, WorkflowProgress, WorkflowStage,
};
use super::state::{StageResult, WorkflowOutcome, WorkflowState, WorkflowStatus};
use crate::analysis::{SampleAnalyzer, check_convergence};
use crate::applier::{apply_rules, execution_plan};
use crate::config::{ConfigValidationError, IncrementalWorkflowConfig};
use crate::discovery::{RuleDiscovery, merge_rules};
use crate::error::{IncrementalError, Result, ResultExt};
use crate::hitl::{
    HITLAnswer, HITLQuestion, QuestionGenerator, RESPONDER_AUTO_APPROVAL, RESPONDER_SKIP_HITL,
    RESPONDER_USER, answer_with_recommendation, apply_answer,
};
use crate::reporting::DeliverableGenerator;
use crate::sampling::SamplingEngine;
use crate::types::{ApprovalState, PreprocessingRule, SampleAnalysis};
use chrono::Utc;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Directory under the output directory used by the default checkpoint store.
pub const CHECKPOINT_DIR: &str = "checkpoints";

/// Read a CSV dataset with a header row.
pub fn load_dataset(path: &Path) -> Result<DataFrame> {
    // Full-table schema inference: a late float in an integer-looking column
    // must not fail the read.
    CsvReadOptions::default()
        .with_infer_schema_length(None)
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .context(format!("Failed to read dataset {}", path.display()))
}

/// Drives a session through sampling, review, bulk processing and delivery.
///
/// Use [`IncrementalWorkflow::builder()`] to create one.
///
/// # Example
///
/// ```rust,ignore
/// use lex_incremental::{IncrementalWorkflow, IncrementalWorkflowConfig, WorkflowOutcome};
///
/// let workflow = IncrementalWorkflow::builder()
///     .config(IncrementalWorkflowConfig::builder().output_dir("out").build()?)
///     .on_progress(|update| println!("[{:.0}%] {}", update.progress * 100.0, update.message))
///     .build()?;
///
/// match workflow.start("data.csv")? {
///     WorkflowOutcome::Completed { manifest, .. } => println!("{}", manifest.cleaned_data.display()),
///     WorkflowOutcome::AwaitingInput { state, questions } => {
///         let answers = ask_someone(&questions);
///         workflow.resume(&state.session_id, &answers)?;
///     }
/// }
/// ```
pub struct IncrementalWorkflow {
    config: IncrementalWorkflowConfig,
    checkpoints: Arc<dyn CheckpointStore>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
}

static_assertions::assert_impl_all!(IncrementalWorkflow: Send, Sync);

impl IncrementalWorkflow {
    pub fn builder() -> IncrementalWorkflowBuilder {
        IncrementalWorkflowBuilder::default()
    }

    pub fn config(&self) -> &IncrementalWorkflowConfig {
        &self.config
    }

    pub fn checkpoint_store(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    /// Start a new session on the CSV dataset at `dataset_path`.
    ///
    /// # Errors
    ///
    /// Fails when the dataset cannot be read, when a checkpoint cannot be
    /// written, when the failed-rule ratio of bulk
    /// processing exceeds `max_error_rate`, and with
    /// [`IncrementalError::Cancelled`] once the token is cancelled.
    pub fn start(&self, dataset_path: impl AsRef<Path>) -> Result<WorkflowOutcome> {
        let path = dataset_path.as_ref();
        self.log_failure(self.start_internal(path))
    }

    /// Load the session `session_id`, apply `answers` and continue.
    pub fn resume(&self, session_id: &str, answers: &[HITLAnswer]) -> Result<WorkflowOutcome> {
        let state = self.checkpoints.load(session_id)?;
        self.resume_from_state(state, answers)
    }

    /// Continue a session from a state the caller already holds.
    ///
    /// Answers are validated against the pending questions before anything
    /// is stored; an invalid answer leaves the last checkpoint untouched.
    pub fn resume_from_state(
        &self,
        state: WorkflowState,
        answers: &[HITLAnswer],
    ) -> Result<WorkflowOutcome> {
        self.log_failure(self.resume_internal(state, answers))
    }

    fn log_failure(&self, result: Result<WorkflowOutcome>) -> Result<WorkflowOutcome> {
        if let Err(e) = &result {
            if e.is_cancelled() {
                warn!("Workflow cancelled");
            } else {
                error!("Workflow error: {}", e);
            }
        }
        result
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(IncrementalError::Cancelled);
        }
        Ok(())
    }

    fn report_progress(&self, update: WorkflowProgress) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn report_stage(
        &self,
        state: &WorkflowState,
        stage: WorkflowStage,
        stage_progress: f32,
        message: impl Into<String>,
    ) {
        self.report_progress(
            WorkflowProgress::new(stage, stage_progress, message).with_metrics(
                state.discovered_rules.len(),
                state.confidence,
                state.converged,
            ),
        );
    }

    fn start_internal(&self, path: &Path) -> Result<WorkflowOutcome> {
        self.check_cancelled()?;
        let df = load_dataset(path)?;

        let mut state = WorkflowState::new(path, df.height(), self.config.clone());
        info!(
            session = %state.session_id,
            rows = df.height(),
            columns = df.width(),
            "Starting incremental workflow on {}",
            path.display()
        );

        state.current_stage = WorkflowStage::InitialExploration;
        self.checkpoints.save(&state)?;
        self.run(state, Some(df))
    }

    fn resume_internal(
        &self,
        mut state: WorkflowState,
        answers: &[HITLAnswer],
    ) -> Result<WorkflowOutcome> {
        if state.is_completed() {
            return Err(IncrementalError::InvalidState(format!(
                "session {} is already completed",
                state.session_id
            )));
        }
        self.check_cancelled()?;
        info!(
            session = %state.session_id,
            stage = state.current_stage.display_name(),
            answers = answers.len(),
            "Resuming workflow"
        );

        apply_answers(&mut state, answers)?;

        if state.status == WorkflowStatus::AwaitingInput {
            if !state.pending_questions.is_empty() {
                self.checkpoints.save(&state)?;
                let questions = state.pending_questions.clone();
                return Ok(WorkflowOutcome::AwaitingInput {
                    state: Box::new(state),
                    questions,
                });
            }
            // The paused stage is already recorded; only its transition is left.
            state.status = WorkflowStatus::Running;
            self.advance(&mut state);
            self.checkpoints.save(&state)?;
        }

        self.run(state, None)
    }

    /// Run stages from `state.current_stage` until a pause or completion.
    fn run(&self, mut state: WorkflowState, data: Option<DataFrame>) -> Result<WorkflowOutcome> {
        let df = match data {
            Some(df) => df,
            None => load_dataset(&state.dataset_path)?,
        };

        loop {
            self.check_cancelled()?;
            match state.current_stage {
                WorkflowStage::NotStarted => {
                    state.current_stage = WorkflowStage::InitialExploration;
                }
                WorkflowStage::BulkProcessing => return self.run_bulk(state, df),
                WorkflowStage::Completed => {
                    return Err(IncrementalError::InvalidState(format!(
                        "session {} is already completed",
                        state.session_id
                    )));
                }
                stage => {
                    let questions = self.run_sampling_stage(&mut state, &df)?;
                    if !questions.is_empty() {
                        info!(
                            session = %state.session_id,
                            stage = stage.display_name(),
                            questions = questions.len(),
                            "Pausing for human review"
                        );
                        state.status = WorkflowStatus::AwaitingInput;
                        state.pending_questions = questions.clone();
                        self.checkpoints.save(&state)?;
                        self.report_stage(
                            &state,
                            stage,
                            1.0,
                            format!("Waiting for {} answer(s)", questions.len()),
                        );
                        return Ok(WorkflowOutcome::AwaitingInput {
                            state: Box::new(state),
                            questions,
                        });
                    }
                    self.advance(&mut state);
                    self.checkpoints.save(&state)?;
                }
            }
        }
    }

    /// Sample, analyze, discover and auto-resolve for the current stage.
    ///
    /// Returns the questions that still need a human.
    fn run_sampling_stage(
        &self,
        state: &mut WorkflowState,
        df: &DataFrame,
    ) -> Result<Vec<HITLQuestion>> {
        let stage = state.current_stage;
        let number = stage.number().unwrap_or(1);
        let started = Instant::now();
        let config = state.config.clone();
        let ratio = config.stage_ratios.for_stage(number);

        self.report_stage(state, stage, 0.0, format!("Sampling {:.2}% of the dataset", ratio * 100.0));
        info!(stage = number, ratio, "Running {}", stage.display_name());

        let outcome = SamplingEngine::new(config.sampling.clone()).sample(
            df,
            ratio,
            config.random_seed.wrapping_add(u64::from(number)),
        )?;
        self.check_cancelled()?;

        self.report_stage(state, stage, 0.3, format!("Analyzing {} rows", outcome.data.height()));
        let analysis = SampleAnalyzer::new(config.analysis.clone()).analyze(
            &outcome.data,
            number,
            outcome.effective_ratio,
            &self.cancellation_token,
        )?;

        self.report_stage(state, stage, 0.6, "Discovering rules");
        let discovered = RuleDiscovery::new(config.analysis.clone()).discover(&analysis);
        let merged = merge_rules(&mut state.discovered_rules, discovered.clone());
        let resolved = auto_resolve(state, &analysis);

        let mut notes = outcome.validation.warnings.clone();
        if outcome.effective_ratio > outcome.requested_ratio {
            notes.push(format!(
                "Sample ratio raised from {:.4} to {:.4} to reach {} rows",
                outcome.requested_ratio, outcome.effective_ratio, config.sampling.min_sample_size
            ));
        }
        if resolved > 0 {
            notes.push(format!("{resolved} decision(s) resolved automatically"));
        }

        state.stage_results.insert(
            number,
            StageResult {
                stage: number,
                sample_size: outcome.data.height(),
                requested_ratio: outcome.requested_ratio,
                sample_ratio: outcome.effective_ratio,
                strategy: Some(outcome.strategy),
                analysis: analysis.clone(),
                rules_discovered: discovered,
                duration_ms: started.elapsed().as_millis() as u64,
                notes,
            },
        );
        state.sync_approved();
        state.refresh_confidence();

        info!(
            stage = number,
            sample_size = outcome.data.height(),
            strategy = outcome.strategy.as_str(),
            added = merged.added,
            updated = merged.updated,
            confidence = state.confidence,
            "{} complete",
            stage.display_name()
        );

        Ok(QuestionGenerator::generate_all(
            &state.discovered_rules,
            Some(&analysis),
        ))
    }

    /// Move past a finished sampling stage, skipping ahead on convergence.
    fn advance(&self, state: &mut WorkflowState) {
        let stage = state.current_stage;
        let Some(number) = stage.number() else {
            return;
        };
        state.refresh_confidence();

        let previous = number
            .checked_sub(1)
            .and_then(|n| state.stage_results.get(&n))
            .map(|r| &r.analysis);
        let current = state.stage_results.get(&number).map(|r| &r.analysis);
        state.converged = match (previous, current) {
            (Some(previous), Some(current)) => {
                let report = check_convergence(previous, current, state.config.convergence_threshold);
                let converged = report.converged;
                debug!(
                    stage = number,
                    difference = report.mean_relative_difference,
                    converged,
                    "Convergence check"
                );
                state.last_convergence = Some(report);
                converged
            }
            _ => false,
        };

        let confident = state.confidence >= state.config.min_confidence_threshold;
        state.current_stage = if number >= 4 {
            WorkflowStage::BulkProcessing
        } else if state.converged && confident && state.config.allow_convergence_skip {
            state.skipped_stages = (number + 1..=4).collect();
            info!(
                stage = number,
                skipped = ?state.skipped_stages,
                confidence = state.confidence,
                "Converged early; proceeding to bulk processing"
            );
            WorkflowStage::BulkProcessing
        } else {
            stage.next()
        };

        self.report_stage(
            state,
            stage,
            1.0,
            format!("{} complete", stage.display_name()),
        );
    }

    /// Apply the approved rules to the full dataset and write the deliverables.
    fn run_bulk(&self, mut state: WorkflowState, mut df: DataFrame) -> Result<WorkflowOutcome> {
        let stage = WorkflowStage::BulkProcessing;
        let started = Instant::now();
        let (plan, superseded) = execution_plan(&state.discovered_rules);

        self.report_stage(
            &state,
            stage,
            0.0,
            format!("Applying {} rule(s) to {} rows", plan.len(), df.height()),
        );
        info!(rules = plan.len(), rows = df.height(), "Running bulk processing");

        let (rules_discovered, confidence, converged) =
            (state.discovered_rules.len(), state.confidence, state.converged);
        let progress = |index: usize, total: usize, rule: &PreprocessingRule| {
            self.report_progress(
                WorkflowProgress::with_items(stage, index, total, format!("Applying {}", rule.id))
                    .with_metrics(rules_discovered, confidence, converged),
            );
        };
        let batch = apply_rules(
            &mut df,
            &plan,
            Some(&progress),
            &self.cancellation_token,
            state.config.continue_on_failure,
        )?;

        let rate = batch.error_rate();
        if rate > state.config.max_error_rate {
            return Err(IncrementalError::ErrorRateExceeded {
                rate,
                max: state.config.max_error_rate,
            });
        }

        self.report_stage(&state, stage, 0.8, "Analyzing cleaned data");
        let analysis = SampleAnalyzer::new(state.config.analysis.clone()).analyze(
            &df,
            5,
            1.0,
            &self.cancellation_token,
        )?;

        let mut notes: Vec<String> = batch
            .results
            .iter()
            .filter_map(|r| r.error.as_ref().map(|e| format!("{} failed: {}", r.rule.id, e)))
            .collect();
        if !superseded.is_empty() {
            notes.push(format!(
                "Not applied, column dropped by another rule: {}",
                superseded.join(", ")
            ));
        }
        if let Some(halted) = &batch.halted_by {
            notes.push(format!("Stopped after {halted} failed"));
        }

        state.stage_results.insert(
            5,
            StageResult {
                stage: 5,
                sample_size: df.height(),
                requested_ratio: 1.0,
                sample_ratio: 1.0,
                strategy: None,
                analysis,
                rules_discovered: Vec::new(),
                duration_ms: started.elapsed().as_millis() as u64,
                notes,
            },
        );
        state.current_stage = WorkflowStage::Completed;
        state.status = WorkflowStatus::Completed;
        state.completed_at = Some(Utc::now());
        state.pending_questions.clear();

        self.report_stage(&state, stage, 0.9, "Generating deliverables");
        let output_dir = state.config.output_dir.clone();
        let manifest = DeliverableGenerator::generate_all(&state, &mut df, &output_dir)?;
        self.checkpoints.save(&state)?;

        info!(
            session = %state.session_id,
            successful = batch.successful,
            failed = batch.failed,
            rows = df.height(),
            "Workflow completed"
        );
        self.report_progress(
            WorkflowProgress::complete(format!(
                "Applied {} of {} rules",
                batch.successful, batch.total_rules
            ))
            .with_metrics(state.discovered_rules.len(), state.confidence, state.converged),
        );

        Ok(WorkflowOutcome::Completed {
            state: Box::new(state),
            manifest,
            batch,
        })
    }
}

/// Approve what needs no human and settle HITL rules the config allows.
///
/// Returns the number of HITL decisions made automatically.
fn auto_resolve(state: &mut WorkflowState, analysis: &SampleAnalysis) -> usize {
    let config = &state.config;
    let mut resolved = 0;

    for rule in state.discovered_rules.iter_mut().filter(|r| r.is_pending()) {
        if !rule.requires_hitl {
            rule.approval = ApprovalState::Approved;
            continue;
        }

        let responder = if config.skip_hitl {
            RESPONDER_SKIP_HITL
        } else if config.enable_auto_approval && rule.confidence >= config.min_confidence_threshold
        {
            RESPONDER_AUTO_APPROVAL
        } else {
            continue;
        };

        let question = QuestionGenerator::generate(rule, analysis.column(rule.column()));
        let answer = answer_with_recommendation(&question, responder);
        match apply_answer(rule, &question, &answer) {
            Ok(()) => {
                state.decision_log.record(&question, &answer, rule, responder);
                resolved += 1;
            }
            Err(e) => warn!(rule = %rule.id, error = %e, "Automatic decision failed"),
        }
    }
    resolved
}

/// Validate `answers` against the pending questions and apply them.
fn apply_answers(state: &mut WorkflowState, answers: &[HITLAnswer]) -> Result<()> {
    for answer in answers {
        let Some(index) = state
            .pending_questions
            .iter()
            .position(|q| q.id == answer.question_id)
        else {
            return Err(IncrementalError::InvalidAnswer {
                question_id: answer.question_id.clone(),
                reason: "no pending question with this id".to_string(),
            });
        };
        let question = state.pending_questions.remove(index);
        let rule = state.rule_mut(&question.rule_id).ok_or_else(|| {
            IncrementalError::InvalidState(format!(
                "question {} refers to unknown rule {}",
                question.id, question.rule_id
            ))
        })?;
        apply_answer(rule, &question, answer)?;
        let rule = rule.clone();
        state
            .decision_log
            .record(&question, answer, &rule, RESPONDER_USER);
        debug!(question = %question.id, option = %answer.selected_option, "Applied answer");
    }

    state.sync_approved();
    state.refresh_confidence();
    Ok(())
}

/// Builder for [`IncrementalWorkflow`].
#[derive(Default)]
pub struct IncrementalWorkflowBuilder {
    config: Option<IncrementalWorkflowConfig>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

static_assertions::assert_impl_all!(IncrementalWorkflowBuilder: Send);

impl IncrementalWorkflowBuilder {
    pub fn config(mut self, config: IncrementalWorkflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Store checkpoints somewhere other than `<output_dir>/checkpoints`.
    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    /// Store checkpoints as files under `dir`.
    pub fn checkpoint_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_store(Arc::new(FileCheckpointStore::new(dir)))
    }

    /// Set a progress reporter for receiving updates during a session.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// ```rust,ignore
    /// let workflow = IncrementalWorkflow::builder()
    ///     .on_progress(|update| {
    ///         println!("[{:.0}%] {}: {}", update.progress * 100.0, update.stage.display_name(), update.message);
    ///     })
    ///     .build()?;
    /// ```
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(WorkflowProgress) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token for stopping a running session.
    ///
    /// Clone the token and call [`CancellationToken::cancel()`] from any
    /// thread. The workflow returns [`IncrementalError::Cancelled`] at the
    /// next check; the last checkpoint stays the resume point.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the workflow.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigValidationError`] if the configuration is invalid.
    pub fn build(self) -> std::result::Result<IncrementalWorkflow, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let checkpoints = self.checkpoint_store.unwrap_or_else(|| {
            Arc::new(FileCheckpointStore::new(config.output_dir.join(CHECKPOINT_DIR)))
        });

        Ok(IncrementalWorkflow {
            config,
            checkpoints,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        })
    }
}
