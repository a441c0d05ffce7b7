//! Execution context shared by every unit of a run, and the retrying call loop.

use serde::Serialize;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::events::{EventCollector, TaskOutcome};
use crate::metrics;
use crate::model::{DynModel, ModelRequest, RetryPolicy};
use crate::state::OutputKey;
use crate::DeepDiveError;

/// Everything a unit needs to talk to the model during one run.
#[derive(Clone)]
pub struct RunContext {
    pub model: DynModel,
    pub retry: RetryPolicy,
    pub events: EventCollector,
    pub cancel: CancellationToken,
    /// Upper bound on fan-out members calling the model at once.
    pub max_concurrency: usize,
}

impl RunContext {
    pub fn new(model: DynModel) -> Self {
        Self {
            model,
            retry: RetryPolicy::default(),
            events: EventCollector::disabled(),
            cancel: CancellationToken::new(),
            max_concurrency: usize::MAX,
        }
    }

    pub fn from_config(model: DynModel, config: &Config) -> Self {
        Self::new(model)
            .with_retry(config.retry_policy())
            .with_max_concurrency(config.pipeline.max_concurrency)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_events(mut self, events: EventCollector) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }
}

/// Bookkeeping for one finished unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub unit: String,
    pub output_key: OutputKey,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Call the model for one unit, retrying per the context's policy.
pub(crate) async fn invoke(
    ctx: &RunContext,
    output_key: &OutputKey,
    request: &ModelRequest,
) -> Result<(String, UnitReport), DeepDiveError> {
    let unit = request.agent.as_str();
    let started = Instant::now();
    let elapsed_ms = || started.elapsed().as_millis() as u64;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        ctx.events.emit_start(unit, output_key.as_str(), attempt);
        debug!(unit, key = %output_key, attempt, "calling model");

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                ctx.events.emit_finish(unit, TaskOutcome::Cancelled, attempt, elapsed_ms());
                return Err(DeepDiveError::Cancelled);
            }
            result = ctx.model.generate(request) => result,
        };

        match result {
            Ok(text) => {
                let duration_ms = elapsed_ms();
                ctx.events
                    .emit_finish(unit, TaskOutcome::Success, attempt, duration_ms);
                metrics::record_unit(unit, "success", attempt, duration_ms);
                let report = UnitReport {
                    unit: unit.to_string(),
                    output_key: output_key.clone(),
                    attempts: attempt,
                    duration_ms,
                };
                return Ok((text, report));
            }
            Err(err) if ctx.retry.allows_retry_after(attempt, &err) => {
                let delay = ctx.retry.delay_for(attempt);
                warn!(
                    unit,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "model call failed, retrying"
                );
                ctx.events
                    .emit_retry(unit, attempt, delay.as_millis() as u64, err.to_string());
                metrics::record_retry(unit, err.status_code());

                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => {
                        ctx.events.emit_finish(unit, TaskOutcome::Cancelled, attempt, elapsed_ms());
                        return Err(DeepDiveError::Cancelled);
                    }
                    _ = sleep(delay) => {}
                }
            }
            Err(err) => {
                let duration_ms = elapsed_ms();
                let retryable = ctx.retry.is_retryable(&err);
                error!(unit, attempts = attempt, error = %err, "unit failed permanently");
                ctx.events.emit_finish(
                    unit,
                    TaskOutcome::Failure {
                        reason: err.to_string(),
                        retryable,
                    },
                    attempt,
                    duration_ms,
                );
                metrics::record_unit(unit, "failure", attempt, duration_ms);
                return Err(DeepDiveError::UnitFailed {
                    unit: unit.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}
