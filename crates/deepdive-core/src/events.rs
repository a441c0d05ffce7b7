//! Run lifecycle events.
//!
//! The executor reports status transitions and unit attempts through an
//! [`EventCollector`]; a [`TraceCollector`](crate::TraceCollector) turns the
//! stream into a persisted trace.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::pipeline::PipelineStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StatusChanged {
        timestamp_ms: i64,
        from: PipelineStatus,
        to: PipelineStatus,
    },
    UnitStarted {
        timestamp_ms: i64,
        unit: String,
        output_key: String,
        attempt: u32,
    },
    UnitRetrying {
        timestamp_ms: i64,
        unit: String,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    UnitFinished {
        timestamp_ms: i64,
        unit: String,
        outcome: TaskOutcome,
        attempts: u32,
        duration_ms: u64,
    },
}

impl Event {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            Event::StatusChanged { timestamp_ms, .. }
            | Event::UnitStarted { timestamp_ms, .. }
            | Event::UnitRetrying { timestamp_ms, .. }
            | Event::UnitFinished { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    /// Unit name, or `pipeline` for status transitions.
    pub fn subject(&self) -> &str {
        match self {
            Event::StatusChanged { .. } => "pipeline",
            Event::UnitStarted { unit, .. }
            | Event::UnitRetrying { unit, .. }
            | Event::UnitFinished { unit, .. } => unit,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Event::StatusChanged { from, to, .. } => format!("{} -> {}", from.as_str(), to.as_str()),
            Event::UnitStarted {
                output_key,
                attempt,
                ..
            } => format!("attempt {attempt} started ({output_key})"),
            Event::UnitRetrying {
                attempt,
                delay_ms,
                reason,
                ..
            } => format!("attempt {attempt} failed, retrying in {delay_ms}ms: {reason}"),
            Event::UnitFinished {
                outcome,
                attempts,
                duration_ms,
                ..
            } => format!(
                "{} after {attempts} attempt(s) in {duration_ms}ms",
                outcome.as_str()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failure { reason: String, retryable: bool },
    Cancelled,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Success => "success",
            TaskOutcome::Failure { .. } => "failure",
            TaskOutcome::Cancelled => "cancelled",
        }
    }
}

/// Cloneable handle used by the executor to emit events.
#[derive(Clone, Default)]
pub struct EventCollector {
    sender: Option<mpsc::UnboundedSender<Event>>,
}

impl EventCollector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A collector that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit_status(&self, from: PipelineStatus, to: PipelineStatus) {
        self.send(Event::StatusChanged {
            timestamp_ms: now_ms(),
            from,
            to,
        });
    }

    pub fn emit_start(&self, unit: &str, output_key: &str, attempt: u32) {
        self.send(Event::UnitStarted {
            timestamp_ms: now_ms(),
            unit: unit.to_string(),
            output_key: output_key.to_string(),
            attempt,
        });
    }

    pub fn emit_retry(&self, unit: &str, attempt: u32, delay_ms: u64, reason: String) {
        self.send(Event::UnitRetrying {
            timestamp_ms: now_ms(),
            unit: unit.to_string(),
            attempt,
            delay_ms,
            reason,
        });
    }

    pub fn emit_finish(&self, unit: &str, outcome: TaskOutcome, attempts: u32, duration_ms: u64) {
        self.send(Event::UnitFinished {
            timestamp_ms: now_ms(),
            unit: unit.to_string(),
            outcome,
            attempts,
            duration_ms,
        });
    }

    fn send(&self, event: Event) {
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.send(event) {
                tracing::warn!(error = %e, "failed to emit run event");
            }
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collector_forwards_events() {
        let (collector, mut receiver) = EventCollector::new();
        collector.emit_start("EthicsAgent", "ethics_check", 1);
        collector.emit_finish("EthicsAgent", TaskOutcome::Success, 1, 12);

        match receiver.recv().await.unwrap() {
            Event::UnitStarted { unit, attempt, .. } => {
                assert_eq!(unit, "EthicsAgent");
                assert_eq!(attempt, 1);
            }
            other => panic!("expected UnitStarted, got {other:?}"),
        }
        let finished = receiver.recv().await.unwrap();
        assert_eq!(finished.subject(), "EthicsAgent");
        assert_eq!(finished.describe(), "success after 1 attempt(s) in 12ms");
    }

    #[test]
    fn disabled_collector_is_silent() {
        let collector = EventCollector::disabled();
        collector.emit_status(PipelineStatus::NotStarted, PipelineStatus::FanningOut);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event::StatusChanged {
            timestamp_ms: 1,
            from: PipelineStatus::FanningOut,
            to: PipelineStatus::Failed,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "status_changed");
        assert_eq!(value["to"], "failed");
    }
}
