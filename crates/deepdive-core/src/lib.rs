//! DeepDive core: a two-stage research pipeline.
//!
//! A [`FanOutGroup`] of independent [`TaskUnit`]s runs concurrently against a
//! [`ResearchModel`](model::ResearchModel); once every member has produced its
//! output, an [`AggregatorUnit`] synthesizes them into one result. The
//! [`Pipeline`] drives both stages and reports lifecycle events along the way.

mod aggregator;
mod config;
mod error;
mod events;
mod fanout;
mod logging;
mod metrics;
pub mod model;
mod pipeline;
mod report;
mod runtime;
mod security;
mod state;
mod telemetry;
mod template;
mod trace;
mod unit;

pub use aggregator::AggregatorUnit;
pub use config::{
    Config, ConfigLoader, LoggingConfig, ModelConfig, PipelineConfig, ReportConfig, RetryConfig,
    TraceConfig,
};
pub use error::DeepDiveError;
pub use events::{Event, EventCollector, TaskOutcome};
pub use fanout::{FanOutGroup, FanOutOutcome};
pub use logging::{SessionLogInput, log_session_completion, sanitize_text};
pub use pipeline::{CompletedRun, FailedRun, Pipeline, PipelineStatus};
pub use report::{ReportSink, render_markdown, report_file_name, subject_slug};
pub use runtime::{RunContext, UnitReport};
pub use security::{SecretValue, require_env};
pub use state::{OutputKey, PipelineState};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use template::InstructionTemplate;
pub use trace::{TraceCollector, TraceStep, TraceSummary, persist_trace};
pub use unit::{SUBJECT_PLACEHOLDER, TaskUnit, TopicSpec, UnitFactory};
