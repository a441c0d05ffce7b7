use std::time::Duration;

use super::ModelError;
use crate::config::RetryConfig;

/// Per-call retry policy with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub attempts: u32,
    pub initial_delay: Duration,
    pub exp_base: f64,
    pub max_delay: Duration,
    /// Only errors carrying one of these statuses are retried.
    pub http_status_codes: Vec<u16>,
}

impl RetryPolicy {
    pub fn is_retryable(&self, error: &ModelError) -> bool {
        error
            .status_code()
            .is_some_and(|status| self.http_status_codes.contains(&status))
    }

    /// Delay before retry number `retry` (1 = the first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.exp_base.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Whether a failed attempt number `attempt` (1-based) may be followed by another.
    pub fn allows_retry_after(&self, attempt: u32, error: &ModelError) -> bool {
        attempt < self.attempts && self.is_retryable(error)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            initial_delay: saturating_secs(config.initial_delay_secs),
            exp_base: config.exp_base,
            max_delay: saturating_secs(config.max_delay_secs),
            http_status_codes: config.http_status_codes.clone(),
        }
    }
}

/// Out-of-range values clamp to `Duration::MAX`; negative or NaN to zero.
fn saturating_secs(value: f64) -> Duration {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) => duration,
        Err(_) if value > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}
