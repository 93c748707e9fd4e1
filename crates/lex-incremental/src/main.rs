//! CLI entry point for the incremental preprocessing workflow.

use anyhow::{Context, Result, anyhow};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use lex_incremental::{
    HITLAnswer, HITLQuestion, IncrementalError, IncrementalWorkflow, IncrementalWorkflowConfig,
    SamplingStrategyKind, WorkflowOutcome,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File the pending questions of a paused session are written to.
const PENDING_QUESTIONS_FILE: &str = "pending_questions.json";

/// CLI-compatible sampling strategy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSamplingStrategy {
    /// Uniform sample without replacement
    Random,
    /// Per-class samples preserving the label distribution
    Stratified,
    /// Choose per stage from the label column's shape
    Adaptive,
}

impl From<CliSamplingStrategy> for SamplingStrategyKind {
    fn from(cli: CliSamplingStrategy) -> Self {
        match cli {
            CliSamplingStrategy::Random => SamplingStrategyKind::Random,
            CliSamplingStrategy::Stratified => SamplingStrategyKind::Stratified,
            CliSamplingStrategy::Adaptive => SamplingStrategyKind::Adaptive,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author = "Lex Machina Team",
    version,
    about = "Sampling-driven incremental data preprocessing",
    long_about = "Discovers cleaning rules on growing samples, asks for review where a \
                  decision is ambiguous, then applies the approved rules to the full dataset.\n\n\
                  EXAMPLES:\n  \
                  # Start a session\n  \
                  lex-incremental run -i data.csv -o results/\n\n  \
                  # Answer the questions in results/pending_questions.json, then\n  \
                  lex-incremental resume -s <session-id> -a answers.json -o results/\n\n  \
                  # Accept every recommendation without pausing\n  \
                  lex-incremental run -i data.csv --skip-hitl"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Suppress progress output (only show warnings, errors and the final result)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new session on a CSV file
    Run(RunArgs),
    /// Continue a paused session with a JSON file of answers
    Resume(ResumeArgs),
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    /// Path to the CSV file to process
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for deliverables and checkpoints
    #[arg(short, long, default_value = "./outputs")]
    output: PathBuf,

    /// JSON file with a full workflow configuration
    ///
    /// Flags given on the command line override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Label column used for stratified sampling
    #[arg(long)]
    label_column: Option<String>,

    /// Sampling strategy (chosen per stage when omitted)
    #[arg(long, value_enum)]
    strategy: Option<CliSamplingStrategy>,

    /// Seed for sampling; stage n uses seed + n
    #[arg(long)]
    seed: Option<u64>,

    /// Answer every question with its recommended option
    #[arg(long)]
    skip_hitl: bool,

    /// Approve review rules whose confidence reaches the threshold
    #[arg(long)]
    auto_approve: bool,

    /// Minimum workflow confidence (0.0 - 1.0)
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Maximum share of failed rules in bulk processing (0.0 - 1.0)
    #[arg(long)]
    max_error_rate: Option<f64>,

    /// Do not generate the preprocessing script
    #[arg(long)]
    no_script: bool,

    /// Do not generate the markdown report
    #[arg(long)]
    no_report: bool,
}

#[derive(ClapArgs, Debug)]
struct ResumeArgs {
    /// Session id printed when the session paused
    #[arg(short, long)]
    session: String,

    /// JSON file containing an array of answers
    #[arg(short, long)]
    answers: PathBuf,

    /// Output directory the session was started with
    #[arg(short, long, default_value = "./outputs")]
    output: PathBuf,
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.quiet);

    // Load environment variables from .env file
    dotenv().ok();

    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Resume(args) => resume(args),
    };
    if let Err(e) = &result
        && let Some(hint) = retry_hint(e)
    {
        eprintln!("{hint}");
    }
    result
}

/// Guidance for errors the user can fix and retry without losing work.
fn retry_hint(error: &anyhow::Error) -> Option<String> {
    let err = error.downcast_ref::<IncrementalError>()?;
    if !err.is_recoverable() {
        return None;
    }
    let hint = match err {
        IncrementalError::Cancelled => {
            "The session was cancelled; its last checkpoint is intact, resume it to continue."
        }
        IncrementalError::InvalidAnswer { .. } => {
            "The session is unchanged; correct the answers file and resume again."
        }
        _ => "Nothing was changed; correct the input and run the command again.",
    };
    Some(format!("[{}] {hint}", err.error_code()))
}

fn run(args: RunArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(anyhow!("Input file not found: {}", args.input.display()));
    }

    let config = build_config(&args)?;
    let workflow = IncrementalWorkflow::builder().config(config).build()?;

    info!("Loading dataset from: {}", args.input.display());
    let outcome = workflow.start(&args.input)?;
    report_outcome(&outcome, &args.output)
}

fn resume(args: ResumeArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.answers)
        .with_context(|| format!("Failed to read answers from {}", args.answers.display()))?;
    let answers: Vec<HITLAnswer> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid answers file {}", args.answers.display()))?;

    let config = IncrementalWorkflowConfig {
        output_dir: args.output.clone(),
        ..Default::default()
    };
    let workflow = IncrementalWorkflow::builder().config(config).build()?;

    info!(session = %args.session, answers = answers.len(), "Resuming session");
    let outcome = workflow.resume(&args.session, &answers)?;
    report_outcome(&outcome, &args.output)
}

fn build_config(args: &RunArgs) -> Result<IncrementalWorkflowConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => IncrementalWorkflowConfig::default(),
    };

    config.output_dir = args.output.clone();
    if let Some(label) = &args.label_column {
        config.sampling.label_column = Some(label.clone());
    }
    if let Some(strategy) = args.strategy {
        config.sampling.strategy = Some(strategy.into());
    }
    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    if let Some(threshold) = args.min_confidence {
        config.min_confidence_threshold = threshold;
    }
    if let Some(rate) = args.max_error_rate {
        config.max_error_rate = rate;
    }
    config.skip_hitl |= args.skip_hitl;
    config.enable_auto_approval |= args.auto_approve;
    config.generate_scripts &= !args.no_script;
    config.generate_report &= !args.no_report;

    config.validate()?;
    Ok(config)
}

/// Print the outcome; for a paused session also write the pending questions.
///
/// Uses `println!` intentionally: this is the command's result, visible
/// regardless of log level.
fn report_outcome(outcome: &WorkflowOutcome, output: &Path) -> Result<()> {
    let state = outcome.state();
    println!("\n{}", "=".repeat(80));

    match outcome {
        WorkflowOutcome::Completed { manifest, batch, .. } => {
            println!("SESSION COMPLETED");
            println!("{}", "=".repeat(80));
            println!("  Session:     {}", state.session_id);
            println!("  Records:     {}", state.total_records);
            println!("  Confidence:  {:.1}%", state.confidence * 100.0);
            println!("  Converged:   {}", if state.converged { "yes" } else { "no" });
            if !state.skipped_stages.is_empty() {
                println!("  Skipped:     stages {:?}", state.skipped_stages);
            }
            println!(
                "  Rules:       {} applied, {} failed, {} approved of {} discovered",
                batch.successful,
                batch.failed,
                state.approved_rules.len(),
                state.discovered_rules.len()
            );
            println!();
            println!("DELIVERABLES");
            println!("{}", "-".repeat(40));
            println!("  {}", manifest.cleaned_data.display());
            for path in [&manifest.script, &manifest.report].into_iter().flatten() {
                println!("  {}", path.display());
            }
            println!("  {}", manifest.metadata.display());
            if batch.failed > 0 {
                warn!("{} rule(s) failed; see the report for details", batch.failed);
            }
        }
        WorkflowOutcome::AwaitingInput { questions, .. } => {
            let path = write_pending_questions(questions, output)?;
            println!("REVIEW NEEDED");
            println!("{}", "=".repeat(80));
            println!("  Session:   {}", state.session_id);
            println!("  Stage:     {}", state.current_stage.display_name());
            println!("  Questions: {}", questions.len());
            println!();
            for question in questions {
                println!("  [{}] {}", question.id, question.prompt);
                for option in &question.options {
                    let marker = if option.recommended { "*" } else { " " };
                    println!("     {marker} {:<12} {}", option.key, option.label);
                }
            }
            println!();
            println!("Questions written to {}", path.display());
            println!(
                "Resume with: lex-incremental resume -s {} -a <answers.json> -o {}",
                state.session_id,
                output.display()
            );
        }
    }

    println!("{}", "=".repeat(80));
    Ok(())
}

fn write_pending_questions(questions: &[HITLQuestion], output: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let path = output.join(PENDING_QUESTIONS_FILE);
    let json = serde_json::to_string_pretty(questions)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_hint_only_for_recoverable_errors() {
        let answer = anyhow::Error::from(IncrementalError::InvalidAnswer {
            question_id: "q-1".to_string(),
            reason: "no pending question with this id".to_string(),
        });
        let hint = retry_hint(&answer).unwrap();
        assert!(hint.starts_with("[INVALID_ANSWER]"));
        assert!(hint.contains("answers file"));

        let checkpoint = anyhow::Error::from(IncrementalError::Checkpoint("corrupt".to_string()));
        assert!(retry_hint(&checkpoint).is_none());
        assert!(retry_hint(&anyhow!("Input file not found")).is_none());
    }
}
