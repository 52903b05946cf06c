//! Retry policy for failed downloads.
//!
//! Exponential backoff by default, optionally fixed, both capped.

use std::time::Duration;

use crate::config::OrganizerSettings;

use super::error::JobError;

/// Retry policy with configurable backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries before permanent failure.
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: u64,
    /// Cap for exponential growth, in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied per retry (ignored in fixed mode).
    pub backoff_multiplier: f64,
    /// Fixed mode: every retry waits `initial_backoff_ms`.
    pub fixed: bool,
}

impl RetryPolicy {
    /// Create a RetryPolicy from configuration settings.
    pub fn new(settings: &OrganizerSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff_ms: settings.initial_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            backoff_multiplier: settings.backoff_multiplier,
            fixed: settings.fixed_backoff,
        }
    }

    /// Backoff before the retry following `retry_count` failures.
    ///
    /// Exponential mode: `initial * multiplier^retry_count`, capped at
    /// `max_backoff_ms`. Fixed mode: always `initial`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        if self.fixed {
            return Duration::from_millis(self.initial_backoff_ms);
        }
        let backoff =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(retry_count as i32);
        Duration::from_millis(backoff.min(self.max_backoff_ms as f64) as u64)
    }

    /// Whether an error should be retried after `retry_count` failures.
    pub fn should_retry(&self, error: &JobError, retry_count: u32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            fixed: false,
        }
    }
}
