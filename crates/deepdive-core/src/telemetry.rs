use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt};

use crate::DeepDiveError;
use crate::config::LoggingConfig;

static TELEMETRY_GUARD: OnceLock<()> = OnceLock::new();

/// Configuration options when initialising telemetry.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub env_filter: Option<String>,
    pub with_ansi: bool,
    pub with_target: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            env_filter: None,
            with_ansi: true,
            with_target: false,
        }
    }
}

impl From<&LoggingConfig> for TelemetryOptions {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            env_filter: Some(config.level.clone()),
            ..Self::default()
        }
    }
}

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter. Safe to call multiple times;
/// only the first invocation installs the subscriber.
pub fn init_telemetry(options: TelemetryOptions) -> Result<(), DeepDiveError> {
    if TELEMETRY_GUARD.get().is_some() {
        return Ok(());
    }

    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .or(options.env_filter)
        .unwrap_or_else(|| "info".to_string());

    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_ansi(options.with_ansi)
        .with_target(options.with_target)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| {
            DeepDiveError::InvalidConfiguration(format!("telemetry init failed: {err}"))
        })?;

    TELEMETRY_GUARD.get_or_init(|| ());
    Ok(())
}
