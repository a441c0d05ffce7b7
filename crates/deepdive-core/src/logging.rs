use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::warn;

use crate::pipeline::PipelineStatus;

const LOG_DIR_ENV: &str = "DEEPDIVE_LOG_DIR";
const RETENTION_ENV: &str = "DEEPDIVE_LOG_RETENTION_DAYS";
const DEFAULT_LOG_DIR: &str = "data/logs";
const DEFAULT_RETENTION_DAYS: u64 = 90;

static REDACTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key",
            Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid api_key regex"),
        ),
        (
            "bearer",
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "google_key",
            Regex::new(r"(AIza[0-9A-Za-z\-_]{35})").expect("invalid google_key regex"),
        ),
    ]
});

/// One finished run, as recorded in the session log.
#[derive(Debug, Clone)]
pub struct SessionLogInput {
    pub run_id: String,
    pub workflow: String,
    pub subject: String,
    pub status: PipelineStatus,
    pub summary: String,
    pub error: Option<String>,
    pub total_attempts: u32,
    pub report_path: Option<String>,
    pub trace_path: Option<String>,
}

#[derive(Serialize)]
struct SessionLogRecord {
    timestamp: String,
    run_id: String,
    workflow: String,
    subject: String,
    status: PipelineStatus,
    summary: String,
    error: Option<String>,
    total_attempts: u32,
    report_path: Option<String>,
    trace_path: Option<String>,
    redactions: Vec<String>,
}

#[derive(Serialize)]
struct AuditLogRecord {
    timestamp: String,
    run_id: String,
    redactions: Vec<String>,
}

fn log_base_dir() -> PathBuf {
    std::env::var(LOG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR))
}

fn retention_days() -> u64 {
    std::env::var(RETENTION_ENV)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETENTION_DAYS)
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let line = serde_json::to_string(value)?;
    writeln!(writer, "{line}")
        .with_context(|| format!("failed to append log entry to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Mask anything that looks like a credential, noting which patterns fired.
pub fn sanitize_text(input: &str, redactions: &mut BTreeSet<String>) -> String {
    let mut output = input.to_string();
    for (name, regex) in REDACTION_PATTERNS.iter() {
        let mut matched = false;
        output = regex
            .replace_all(&output, |caps: &Captures| {
                matched = true;
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
        if matched {
            redactions.insert((*name).to_string());
        }
    }
    output
}

/// Append one record for a finished run, then prune logs past retention.
/// Returns the session log path.
pub fn log_session_completion(input: SessionLogInput) -> Result<PathBuf> {
    let timestamp = Utc::now();
    let mut redactions = BTreeSet::new();

    let subject = sanitize_text(&input.subject, &mut redactions);
    let summary = sanitize_text(&input.summary, &mut redactions);
    let error = input
        .error
        .as_deref()
        .map(|value| sanitize_text(value, &mut redactions));

    let record = SessionLogRecord {
        timestamp: timestamp.to_rfc3339(),
        run_id: input.run_id.clone(),
        workflow: input.workflow,
        subject,
        status: input.status,
        summary,
        error,
        total_attempts: input.total_attempts,
        report_path: input.report_path,
        trace_path: input.trace_path,
        redactions: redactions.into_iter().collect(),
    };

    let base_dir = log_base_dir();
    let month_dir = base_dir
        .join(format!("{:04}", timestamp.year()))
        .join(format!("{:02}", timestamp.month()));
    let session_log_path = month_dir.join("session.jsonl");
    append_json_line(&session_log_path, &record)?;

    if !record.redactions.is_empty() {
        let audit = AuditLogRecord {
            timestamp: record.timestamp.clone(),
            run_id: input.run_id.clone(),
            redactions: record.redactions.clone(),
        };
        append_json_line(&month_dir.join("audit.jsonl"), &audit)?;
        warn!(
            run_id = %input.run_id,
            fields = ?record.redactions,
            "redacted potential secrets from session log"
        );
    }

    enforce_retention(&base_dir)?;

    Ok(session_log_path)
}

fn enforce_retention(base_dir: &Path) -> Result<()> {
    let retention = retention_days();
    if retention == 0 || !base_dir.exists() {
        return Ok(());
    }
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(retention.saturating_mul(86_400)))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    prune_directory(base_dir, cutoff)
}

fn prune_directory(dir: &Path, cutoff: SystemTime) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            prune_directory(&path, cutoff)?;
            if path.read_dir()?.next().is_none() {
                fs::remove_dir(&path).ok();
            }
        } else if metadata.is_file()
            && metadata
                .modified()
                .map(|time| time < cutoff)
                .unwrap_or(false)
        {
            fs::remove_file(&path).ok();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    #[test]
    fn sanitizer_masks_known_secret_shapes() {
        let mut redactions = BTreeSet::new();
        let key = format!("AIza{}", "x".repeat(35));
        let text = format!("api_key=abcd1234 and Bearer tok.en and {key}");
        let cleaned = sanitize_text(&text, &mut redactions);

        assert_eq!(
            cleaned,
            "api_key=[REDACTED] and Bearer [REDACTED] and [REDACTED]"
        );
        let names: Vec<_> = redactions.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["api_key", "bearer", "google_key"]);
    }

    #[test]
    fn plain_text_is_untouched() {
        let mut redactions = BTreeSet::new();
        let cleaned = sanitize_text("Buy on strong free cash flow.", &mut redactions);
        assert_eq!(cleaned, "Buy on strong free cash flow.");
        assert!(redactions.is_empty());
    }

    #[test]
    fn session_logging_sanitizes_and_persists() -> Result<()> {
        let temp = TempDir::new().expect("temp dir");
        // SAFETY: this is the only test in the crate touching these variables.
        unsafe {
            std::env::set_var(LOG_DIR_ENV, temp.path());
            std::env::set_var(RETENTION_ENV, "0");
        }

        let path = log_session_completion(SessionLogInput {
            run_id: "run-1".to_string(),
            workflow: "investment".to_string(),
            subject: "ACME".to_string(),
            status: PipelineStatus::Complete,
            summary: "Summary leaking api_key=topsecret".to_string(),
            error: None,
            total_attempts: 17,
            report_path: Some("reports/acme.md".to_string()),
            trace_path: None,
        })?;

        assert!(path.starts_with(temp.path()));
        assert_eq!(path.file_name().unwrap(), "session.jsonl");
        let line = std::fs::read_to_string(&path)?;
        let record: Value = serde_json::from_str(line.trim())?;
        assert_eq!(record["run_id"], "run-1");
        assert_eq!(record["status"], "complete");
        assert_eq!(record["total_attempts"], 17);
        assert!(record["summary"].as_str().unwrap().contains("[REDACTED]"));
        assert!(!line.contains("topsecret"));

        let audit = path.with_file_name("audit.jsonl");
        assert!(audit.exists());
        Ok(())
    }
}
