use std::path::PathBuf;

use thiserror::Error;

use crate::model::ModelError;
use crate::pipeline::PipelineStatus;

/// Core error type for DeepDive.
#[derive(Debug, Error)]
pub enum DeepDiveError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error(
        "authentication error: {0} not found; add it to your environment or .env file"
    )]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid output key {0:?}: expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidOutputKey(String),
    #[error("output key `{0}` is declared more than once")]
    DuplicateOutputKey(String),
    #[error("unit name `{0}` is declared more than once")]
    DuplicateUnitName(String),
    #[error("fan-out group `{0}` has no members")]
    EmptyGroup(String),
    #[error("unit `{unit}` references `{key}`, which a member of the same group produces")]
    DependentMember { unit: String, key: String },
    #[error("aggregator `{aggregator}` references `{key}`, which no unit produces")]
    UnknownReference { aggregator: String, key: String },
    #[error("output `{0}` is missing from pipeline state")]
    MissingOutput(String),
    #[error("unit `{unit}` failed after {attempts} attempt(s): {source}")]
    UnitFailed {
        unit: String,
        attempts: u32,
        #[source]
        source: ModelError,
    },
    #[error("unit `{0}` was aborted before completing")]
    UnitAborted(String),
    #[error("run cancelled")]
    Cancelled,
    #[error("invalid pipeline transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: PipelineStatus,
        to: PipelineStatus,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeepDiveError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    /// Whether the error stems from the run being cancelled rather than failing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
