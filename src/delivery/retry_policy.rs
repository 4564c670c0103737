//! Retry policy for stream record processing.
//!
//! Implements exponential backoff with configurable parameters.

use std::time::Duration;
use thiserror::Error;

use crate::config::DeliverySettings;

/// Why handling a record failed, and whether trying again can help.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("retryable: {0:#}")]
    Retryable(anyhow::Error),

    #[error("terminal: {0:#}")]
    Terminal(anyhow::Error),
}

impl ProcessingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessingError::Retryable(_))
    }
}

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per record, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Cap for exponential growth.
    pub max_backoff: Duration,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(config: &DeliverySettings) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Wait before the next attempt, after `failed_attempts` failures.
    ///
    /// `initial_backoff * multiplier^(failed_attempts - 1)`, capped at `max_backoff`.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `failed_attempts` failures with `error`.
    pub fn should_retry(&self, error: &ProcessingError, failed_attempts: u32) -> bool {
        error.is_retryable() && failed_attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}
