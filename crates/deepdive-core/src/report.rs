//! Markdown rendering of a run's outputs.

use std::fmt::Write as _;
use std::fs::{self, create_dir_all};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::pipeline::Pipeline;
use crate::state::PipelineState;

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("invalid slug regex"));

const FALLBACK_SLUG: &str = "report";

/// Render `state` as a markdown document: aggregator section first, then one
/// section per fan-out member in declaration order. Keys absent from `state`
/// are skipped.
pub fn render_markdown(
    title: &str,
    pipeline: &Pipeline,
    subject: &str,
    state: &PipelineState,
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {title}\n");
    if !subject.trim().is_empty() {
        let _ = writeln!(out, "**Subject:** {}\n", subject.trim());
    }
    let _ = writeln!(
        out,
        "**Generated:** {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    for (key, heading) in pipeline.sections() {
        let Some(text) = state.get(key.as_str()) else {
            continue;
        };
        let _ = writeln!(out, "## {heading}\n");
        let _ = writeln!(out, "{}\n", text.trim_end());
    }

    out
}

/// `ACME Corp.` -> `acme_corp`
pub fn subject_slug(subject: &str) -> String {
    let lowered = subject.trim().to_lowercase();
    let slug = NON_SLUG.replace_all(&lowered, "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

pub fn report_file_name(subject: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}.md",
        subject_slug(subject),
        generated_at.format("%Y%m%d_%H%M%S")
    )
}

/// Writes rendered reports below one directory.
#[derive(Debug, Clone)]
pub struct ReportSink {
    dir: PathBuf,
}

impl ReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn write(
        &self,
        title: &str,
        pipeline: &Pipeline,
        subject: &str,
        state: &PipelineState,
        generated_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        create_dir_all(&self.dir)
            .with_context(|| format!("failed to create report directory {}", self.dir.display()))?;
        let path = self.dir.join(report_file_name(subject, generated_at));
        let markdown = render_markdown(title, pipeline, subject, state, generated_at);
        fs::write(&path, markdown)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        info!(path = %path.display(), "report written");
        Ok(path)
    }
}
