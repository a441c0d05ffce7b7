use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use deepdive_agents::Workflow;
use deepdive_core::model::{DynModel, GeminiClient, OfflineModel};
use deepdive_core::{
    Config, ConfigLoader, Event, EventCollector, FailedRun, Pipeline, PipelineState, PipelineStatus,
    ReportSink, RunContext, SessionLogInput, TelemetryOptions, TraceCollector, TraceSummary,
    UnitFactory, init_telemetry, log_session_completion, persist_trace,
};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const OFFLINE_MODEL: &str = "offline";

#[derive(Parser, Debug)]
#[command(
    name = "deepdive",
    version,
    about = "Parallel research agents with a synthesizing aggregator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a research workflow and write its report.
    Run(RunArgs),
    /// List the agents of a workflow.
    Topics(TopicsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum WorkflowArg {
    Investment,
    Digest,
}

impl From<WorkflowArg> for Workflow {
    fn from(arg: WorkflowArg) -> Self {
        match arg {
            WorkflowArg::Investment => Workflow::Investment,
            WorkflowArg::Digest => Workflow::Digest,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Which pipeline to run.
    #[arg(long, value_enum, default_value_t = WorkflowArg::Investment)]
    workflow: WorkflowArg,

    /// Stock, company or theme to research; prompted for when omitted.
    #[arg(long)]
    subject: Option<String>,

    /// Run the digest without a subject, surveying each field at large.
    #[arg(long, conflicts_with = "subject")]
    generic: bool,

    /// Configuration file (defaults to `DEEPDIVE_CONFIG` or `deepdive.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `[report] dir`.
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Persist the run trace as JSON into this directory.
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Use canned offline answers instead of calling the model provider.
    #[arg(long)]
    offline: bool,

    /// Write a report from whatever outputs exist when the run fails.
    #[arg(long)]
    keep_partial: bool,
}

#[derive(Args, Debug)]
struct TopicsArgs {
    #[arg(long, value_enum, default_value_t = WorkflowArg::Investment)]
    workflow: WorkflowArg,
}

/// How a `run` invocation ended, short of an error.
#[derive(Debug, PartialEq, Eq)]
enum RunOutcome {
    /// No subject was given, so nothing ran.
    Skipped,
    Completed { report: PathBuf },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(args).await.map(|_| ()),
            Command::Topics(args) => topics_command(args, &mut io::stdout()),
        }
    })
}

async fn run_command(args: RunArgs) -> Result<RunOutcome> {
    let config = load_config(&args)?;
    init_telemetry(TelemetryOptions::from(&config.logging))?;

    let model: DynModel = if args.offline {
        info!("offline mode: no provider calls will be made");
        Arc::new(OfflineModel::new())
    } else {
        Arc::new(GeminiClient::new(&config.model, config.api_key()?)?)
    };

    let mut out = io::stdout();
    let subject = {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        resolve_subject(&args, Workflow::from(args.workflow), &mut input, &mut out)?
    };

    // Armed after the prompt; Ctrl-C while prompting still terminates.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling run");
            trigger.cancel();
        }
    });

    execute_run(&args, &config, model, cancel, subject, &mut out).await
}

fn load_config(args: &RunArgs) -> Result<Config> {
    let mut config = ConfigLoader::load(args.config.clone())?;
    if let Some(dir) = &args.report_dir {
        config.report.dir = dir.clone();
    }
    if let Some(dir) = &args.trace_dir {
        config.trace.dir = Some(dir.clone());
    }
    Ok(config)
}

/// `Ok(None)` means the user gave no subject and the run should not start.
fn resolve_subject<R: BufRead, W: Write>(
    args: &RunArgs,
    workflow: Workflow,
    input: &mut R,
    out: &mut W,
) -> Result<Option<String>> {
    if args.generic {
        if !workflow.supports_generic() {
            bail!("--generic is only supported by the digest workflow");
        }
        return Ok(Some(String::new()));
    }

    let subject = match &args.subject {
        Some(subject) => subject.clone(),
        None => {
            let question = match workflow {
                Workflow::Investment => "Which stock or company would you like to analyze? ",
                Workflow::Digest => "Which topic should the digest focus on? ",
            };
            write!(out, "{question}")?;
            out.flush()?;
            let mut line = String::new();
            input
                .read_line(&mut line)
                .context("failed to read subject from stdin")?;
            line
        }
    };

    let subject = subject.trim();
    Ok((!subject.is_empty()).then(|| subject.to_string()))
}

async fn execute_run<W: Write>(
    args: &RunArgs,
    config: &Config,
    model: DynModel,
    cancel: CancellationToken,
    subject: Option<String>,
    out: &mut W,
) -> Result<RunOutcome> {
    let workflow = Workflow::from(args.workflow);
    let Some(subject) = subject else {
        writeln!(out, "No subject provided. Exiting.")?;
        return Ok(RunOutcome::Skipped);
    };
    if cancel.is_cancelled() {
        bail!("interrupted before the {} run started", workflow.as_str());
    }

    let model_name = if args.offline {
        OFFLINE_MODEL
    } else {
        config.model.name.as_str()
    };
    let pipeline = workflow.build(&UnitFactory::new(model_name), &subject)?;

    let (events, receiver) = EventCollector::new();
    let ctx = RunContext::from_config(model, config)
        .with_events(events)
        .with_cancellation(cancel);

    let shown = if subject.is_empty() { "all fields" } else { subject.as_str() };
    writeln!(
        out,
        "Running {} for {shown} with {} agents...",
        workflow.title(),
        pipeline.fan_out().len()
    )?;

    let result = pipeline.run(&ctx, &workflow.kickoff_prompt(&subject)).await;
    let trace_events = TraceCollector::new(receiver).into_events();
    let total_attempts = trace_events
        .iter()
        .filter(|event| matches!(event, Event::UnitStarted { .. }))
        .count() as u32;

    match result {
        Ok(run) => {
            let run_id = run.run_id.to_string();
            let final_output = run.final_output().unwrap_or_default();
            writeln!(out, "\n## {}\n\n{}\n", workflow.title(), final_output)?;

            let report = ReportSink::new(&config.report.dir).write(
                workflow.title(),
                &pipeline,
                &subject,
                &run.state,
                run.finished_at,
            )?;
            writeln!(out, "Report written to {}", report.display())?;

            let trace_path = write_trace(config, &run_id, &trace_events, out)?;
            record_session(config, SessionLogInput {
                run_id,
                workflow: workflow.as_str().to_string(),
                subject: subject.clone(),
                status: run.status(),
                summary: final_output.to_string(),
                error: None,
                total_attempts,
                report_path: Some(report.display().to_string()),
                trace_path,
            });
            Ok(RunOutcome::Completed { report })
        }
        Err(failed) => {
            let run_id = failed.run_id.to_string();
            writeln!(out, "\n{}", TraceSummary::from_events(&trace_events).render_markdown())?;
            let report = if args.keep_partial {
                write_partial(config, workflow, &pipeline, &subject, &failed.state, out)?
            } else {
                None
            };
            let trace_path = write_trace(config, &run_id, &trace_events, out)?;
            record_session(config, SessionLogInput {
                run_id,
                workflow: workflow.as_str().to_string(),
                subject: subject.clone(),
                status: PipelineStatus::Failed,
                summary: String::new(),
                error: Some(failed.to_string()),
                total_attempts,
                report_path: report.map(|path| path.display().to_string()),
                trace_path,
            });
            Err(failure(failed))
        }
    }
}

fn failure(failed: FailedRun) -> anyhow::Error {
    if failed.error.is_cancelled() {
        anyhow::Error::new(failed).context("run cancelled before the report was produced")
    } else {
        anyhow::Error::new(failed)
    }
}

fn write_partial<W: Write>(
    config: &Config,
    workflow: Workflow,
    pipeline: &Pipeline,
    subject: &str,
    state: &PipelineState,
    out: &mut W,
) -> Result<Option<PathBuf>> {
    let title = format!("{} (partial)", workflow.title());
    let path = ReportSink::new(&config.report.dir).write(
        &title,
        pipeline,
        subject,
        state,
        chrono::Utc::now(),
    )?;
    writeln!(out, "Partial report written to {}", path.display())?;
    Ok(Some(path))
}

fn write_trace<W: Write>(
    config: &Config,
    run_id: &str,
    events: &[Event],
    out: &mut W,
) -> Result<Option<String>> {
    let Some(dir) = &config.trace.dir else {
        return Ok(None);
    };
    let path = persist_trace(dir, run_id, events)?;
    writeln!(out, "Trace written to {}", path.display())?;
    Ok(Some(path.display().to_string()))
}

fn record_session(config: &Config, input: SessionLogInput) {
    if !config.logging.session_log {
        return;
    }
    if let Err(err) = log_session_completion(input) {
        warn!(error = %err, "failed to write session log");
    }
}

fn topics_command<W: Write>(args: TopicsArgs, out: &mut W) -> Result<()> {
    let workflow = Workflow::from(args.workflow);
    writeln!(out, "{} ({} workflow)", workflow.title(), workflow.as_str())?;
    for topic in workflow.topics()? {
        writeln!(out, "  {:<28} -> {}", topic.name(), topic.output_key())?;
    }
    writeln!(out, "  aggregator output: {}", workflow.aggregator_key())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepdive_core::model::{ModelError, ModelRequest, ResearchModel};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn args(subject: Option<&str>) -> RunArgs {
        RunArgs {
            workflow: WorkflowArg::Investment,
            subject: subject.map(str::to_string),
            generic: false,
            config: None,
            report_dir: None,
            trace_dir: None,
            offline: true,
            keep_partial: false,
        }
    }

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.report.dir = dir.path().join("reports");
        config.trace.dir = Some(dir.path().join("traces"));
        config.logging.session_log = false;
        config
    }

    struct Unavailable;

    #[async_trait::async_trait]
    impl ResearchModel for Unavailable {
        async fn generate(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            Err(ModelError::status(400, "API key not valid"))
        }
    }

    #[tokio::test]
    async fn empty_subject_exits_without_model_calls() {
        let temp = TempDir::new().unwrap();
        let model = Arc::new(OfflineModel::new());
        let run_args = args(None);
        let mut out = Vec::new();
        let subject = resolve_subject(
            &run_args,
            Workflow::Investment,
            &mut Cursor::new("   \n"),
            &mut out,
        )
        .unwrap();

        let outcome = execute_run(
            &run_args,
            &config_in(&temp),
            model.clone(),
            CancellationToken::new(),
            subject,
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(outcome, RunOutcome::Skipped);
        assert_eq!(model.calls(), 0);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Which stock or company would you like to analyze?"));
        assert!(printed.contains("No subject provided. Exiting."));
        assert!(!temp.path().join("reports").exists());
    }

    #[tokio::test]
    async fn offline_run_writes_report_trace_and_session_log() {
        let temp = TempDir::new().unwrap();
        // SAFETY: only this test sets the variable.
        unsafe {
            std::env::set_var("DEEPDIVE_LOG_DIR", temp.path().join("logs"));
        }
        let model = Arc::new(OfflineModel::new());
        let mut out = Vec::new();
        let mut config = config_in(&temp);
        config.logging.session_log = true;

        let outcome = execute_run(
            &args(Some("ACME")),
            &config,
            model.clone(),
            CancellationToken::new(),
            Some("ACME".to_string()),
            &mut out,
        )
        .await
        .unwrap();

        let RunOutcome::Completed { report } = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(model.calls(), 17);
        let markdown = std::fs::read_to_string(&report).unwrap();
        assert!(markdown.starts_with("# Investment Analysis"));
        assert!(markdown.contains("## Investment Recommendation"));
        assert!(report.file_name().unwrap().to_string_lossy().starts_with("acme_"));

        let traces: Vec<_> = std::fs::read_dir(temp.path().join("traces")).unwrap().collect();
        assert_eq!(traces.len(), 1);
        assert!(temp.path().join("logs").exists());
        assert!(String::from_utf8(out).unwrap().contains("Report written to"));
    }

    #[tokio::test]
    async fn failed_run_is_an_error_and_writes_no_report() {
        let temp = TempDir::new().unwrap();
        let mut out = Vec::new();
        let mut run_args = args(Some("ACME"));
        run_args.workflow = WorkflowArg::Digest;
        let mut config = config_in(&temp);
        config.trace.dir = None;

        let err = execute_run(
            &run_args,
            &config,
            Arc::new(Unavailable),
            CancellationToken::new(),
            Some("ACME".to_string()),
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("pipeline failed while fanning_out"));
        assert!(!temp.path().join("reports").exists());
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_model_calls() {
        let temp = TempDir::new().unwrap();
        let model = Arc::new(OfflineModel::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut out = Vec::new();

        let err = execute_run(
            &args(Some("ACME")),
            &config_in(&temp),
            model.clone(),
            cancel,
            Some("ACME".to_string()),
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("interrupted before the investment run started"));
        assert_eq!(model.calls(), 0);
        assert!(!temp.path().join("reports").exists());
        assert!(!temp.path().join("traces").exists());
    }

    #[test]
    fn generic_is_rejected_for_investment() {
        let mut run_args = args(None);
        run_args.generic = true;
        let err = resolve_subject(
            &run_args,
            Workflow::Investment,
            &mut Cursor::new(""),
            &mut Vec::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("--generic"));

        let subject = resolve_subject(
            &run_args,
            Workflow::Digest,
            &mut Cursor::new(""),
            &mut Vec::new(),
        )
        .unwrap();
        assert_eq!(subject.as_deref(), Some(""));
    }

    #[test]
    fn subject_flag_skips_the_prompt() {
        let mut out = Vec::new();
        let subject = resolve_subject(
            &args(Some("  NVDA ")),
            Workflow::Investment,
            &mut Cursor::new(""),
            &mut out,
        )
        .unwrap();
        assert_eq!(subject.as_deref(), Some("NVDA"));
        assert!(out.is_empty());
    }

    #[test]
    fn topics_lists_every_agent() {
        let mut out = Vec::new();
        topics_command(
            TopicsArgs {
                workflow: WorkflowArg::Digest,
            },
            &mut out,
        )
        .unwrap();
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("TechResearcher"));
        assert!(printed.contains("finance_research"));
        assert!(printed.contains("aggregator output: executive_summary"));
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::parse_from([
            "deepdive",
            "run",
            "--workflow",
            "digest",
            "--generic",
            "--offline",
            "--keep-partial",
        ]);
        let Command::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run.workflow, WorkflowArg::Digest);
        assert!(run.generic && run.offline && run.keep_partial);
    }
}
