use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::model::RetryPolicy;
use crate::{DeepDiveError, SecretValue, require_env};

const DEFAULT_CONFIG_PATH: &str = "deepdive.toml";
const CONFIG_PATH_ENV: &str = "DEEPDIVE_CONFIG";

/// Top-level configuration structure. Every section is optional in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
    pub report: ReportConfig,
    pub trace: TraceConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the configured model credential (from environment only).
    pub fn api_key(&self) -> Result<SecretValue, DeepDiveError> {
        require_env(&self.model.api_key_env)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `DEEPDIVE_CONFIG` environment variable.
    /// 3. `deepdive.toml` in the current working directory.
    ///
    /// A missing file is only an error when it was named explicitly; otherwise
    /// built-in defaults apply.
    pub fn load(path: Option<PathBuf>) -> Result<Config, DeepDiveError> {
        let (candidate, explicit) = resolve_path(path);
        if !explicit && !candidate.exists() {
            let config = Config::default();
            Self::validate(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&candidate)
            .map_err(|err| DeepDiveError::config_io(candidate.clone(), err))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Config, DeepDiveError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| DeepDiveError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), DeepDiveError> {
        if config.model.api_key_env.trim().is_empty() {
            return Err(invalid("model.api_key_env must reference an environment variable"));
        }
        if config.model.name.trim().is_empty() {
            return Err(invalid("model.name must not be empty"));
        }
        if config.model.request_timeout_secs == 0 {
            return Err(invalid("model.request_timeout_secs must be positive"));
        }
        if config.retry.attempts == 0 {
            return Err(invalid("retry.attempts must be at least 1"));
        }
        if !(config.retry.exp_base >= 1.0) {
            return Err(invalid("retry.exp_base must be >= 1"));
        }
        if !(config.retry.initial_delay_secs >= 0.0) || !(config.retry.max_delay_secs >= 0.0) {
            return Err(invalid("retry delays must be non-negative"));
        }
        if config.pipeline.max_concurrency == 0 {
            return Err(invalid("pipeline.max_concurrency must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> DeepDiveError {
    DeepDiveError::InvalidConfiguration(message.to_string())
}

fn resolve_path(path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path, true);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return (PathBuf::from(from_env), true);
        }
    }

    (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub api_key_env: String,
    pub endpoint: String,
    pub request_timeout_secs: u64,
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-2.5-flash-lite".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per model call, including the first.
    pub attempts: u32,
    pub initial_delay_secs: f64,
    pub exp_base: f64,
    pub max_delay_secs: f64,
    pub http_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay_secs: 1.0,
            exp_base: 7.0,
            max_delay_secs: 60.0,
            http_status_codes: vec![429, 500, 503, 504],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on fan-out members talking to the model at once.
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("reports"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Append a JSONL record per finished run under `DEEPDIVE_LOG_DIR`.
    pub session_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            session_log: true,
        }
    }
}
