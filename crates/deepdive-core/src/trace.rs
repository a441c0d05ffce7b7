use std::fmt::Write as _;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::events::Event;

/// Buffers run events drained from an [`EventCollector`](crate::EventCollector) channel.
pub struct TraceCollector {
    receiver: mpsc::UnboundedReceiver<Event>,
    events: Vec<Event>,
}

impl TraceCollector {
    pub fn new(receiver: mpsc::UnboundedReceiver<Event>) -> Self {
        Self {
            receiver,
            events: Vec::new(),
        }
    }

    /// Pull every event currently queued without waiting for more.
    pub fn drain(&mut self) -> &[Event] {
        while let Ok(event) = self.receiver.try_recv() {
            tracing::trace!(subject = %event.subject(), "collected run event");
            self.events.push(event);
        }
        &self.events
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(mut self) -> Vec<Event> {
        self.drain();
        self.events
    }

    pub fn summary(&mut self) -> TraceSummary {
        TraceSummary::from_events(self.drain())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: Vec<TraceStep>,
}

impl TraceSummary {
    pub fn from_events(events: &[Event]) -> Self {
        let steps = events
            .iter()
            .enumerate()
            .map(|(idx, event)| TraceStep {
                index: idx + 1,
                subject: event.subject().to_string(),
                message: event.describe(),
            })
            .collect();
        Self { steps }
    }

    pub fn render_markdown(&self) -> String {
        if self.steps.is_empty() {
            return "No trace events recorded.".to_string();
        }
        let mut output = String::from("### Trace Summary\n");
        for step in &self.steps {
            let _ = writeln!(output, "{}. {}: {}", step.index, step.subject, step.message);
        }
        output
    }
}

/// Write `events` as pretty JSON to `{dir}/{run_id}.json`.
pub fn persist_trace<P: AsRef<Path>>(dir: P, run_id: &str, events: &[Event]) -> Result<PathBuf> {
    let dir = dir.as_ref();
    create_dir_all(dir)
        .with_context(|| format!("failed to create trace directory {}", dir.display()))?;
    let path = dir.join(format!("{run_id}.json"));
    let payload = serde_json::to_vec_pretty(events)?;
    let mut file = File::create(&path)
        .with_context(|| format!("failed to create trace file {}", path.display()))?;
    file.write_all(&payload)
        .with_context(|| format!("failed to write trace file {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventCollector, TaskOutcome};
    use crate::pipeline::PipelineStatus;

    #[test]
    fn markdown_lists_steps_in_order() {
        let (collector, receiver) = EventCollector::new();
        collector.emit_status(PipelineStatus::NotStarted, PipelineStatus::FanningOut);
        collector.emit_finish("EthicsAgent", TaskOutcome::Success, 2, 40);

        let mut trace = TraceCollector::new(receiver);
        let markdown = trace.summary().render_markdown();

        assert!(markdown.starts_with("### Trace Summary\n"));
        assert!(markdown.contains("1. pipeline: not_started -> fanning_out"));
        assert!(markdown.contains("2. EthicsAgent: success after 2 attempt(s) in 40ms"));
    }

    #[test]
    fn empty_trace_renders_placeholder() {
        assert_eq!(
            TraceSummary::default().render_markdown(),
            "No trace events recorded."
        );
    }

    #[test]
    fn persisted_trace_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let (collector, receiver) = EventCollector::new();
        collector.emit_start("EthicsAgent", "ethics_check", 1);
        let events = TraceCollector::new(receiver).into_events();

        let path = persist_trace(dir.path(), "run-1", &events).unwrap();
        assert_eq!(path, dir.path().join("run-1.json"));
        let loaded: Vec<Event> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].subject(), "EthicsAgent");
    }
}
