//! Per-error-class retry and backoff policy for crawl attempts.

use std::time::Duration;

use crate::config::{ClassRetry, RetrySettings};
use crate::utils::error::ErrorClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, optionally after forcing a browser restart, then try again.
    Retry { delay: Duration, restart_session: bool },
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    settings: RetrySettings,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    fn class_settings(&self, class: ErrorClass) -> Option<&ClassRetry> {
        match class {
            ErrorClass::Timeout => Some(&self.settings.timeout),
            ErrorClass::Blocked => Some(&self.settings.blocked),
            ErrorClass::Session => Some(&self.settings.session),
            ErrorClass::Transient => Some(&self.settings.transient),
            // A layout change will not fix itself within the cycle
            ErrorClass::Mismatch => None,
        }
    }

    /// Attempts allowed for a target that keeps failing with `class`.
    pub fn max_attempts(&self, class: ErrorClass) -> u32 {
        self.class_settings(class)
            .map(|c| c.max_attempts.min(self.settings.max_attempts))
            .unwrap_or(1)
    }

    /// Decision after `attempt` (1-based) failed with `class`.
    pub fn decide(&self, class: ErrorClass, attempt: u32) -> RetryDecision {
        let Some(settings) = self.class_settings(class) else {
            return RetryDecision::GiveUp;
        };
        if attempt >= settings.max_attempts || attempt >= self.settings.max_attempts {
            return RetryDecision::GiveUp;
        }

        RetryDecision::Retry {
            delay: Self::calculate_delay(settings, attempt),
            restart_session: class == ErrorClass::Session,
        }
    }

    /// `base * multiplier^(attempt - 1)`, capped at `max_delay_ms`.
    fn calculate_delay(settings: &ClassRetry, attempt: u32) -> Duration {
        let exponential = settings.base_delay_ms as f64 * settings.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_ms = if exponential.is_finite() {
            (exponential as u64).min(settings.max_delay_ms)
        } else {
            settings.max_delay_ms
        };
        Duration::from_millis(delay_ms)
    }
}
