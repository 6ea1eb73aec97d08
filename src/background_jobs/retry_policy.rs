//! Retry policy for failed background jobs.
//!
//! A policy either lists explicit per-retry delays or falls back to
//! exponential backoff.

use super::job::JobError;
use std::time::Duration;

/// Retry policy applied by the engine when a job attempt fails.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Explicit delay before each retry. The last entry is reused when there
    /// are more retries than entries.
    pub delays: Vec<Duration>,
    /// Initial backoff when `delays` is empty.
    pub initial_backoff: Duration,
    /// Cap for exponential growth.
    pub max_backoff: Duration,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Run once, never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_delays(max_attempts: u32, delays: Vec<Duration>) -> Self {
        Self {
            max_attempts,
            delays,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0 for the first retry).
    pub fn backoff(&self, retry: u32) -> Duration {
        if !self.delays.is_empty() {
            let index = (retry as usize).min(self.delays.len() - 1);
            return self.delays[index];
        }
        let backoff =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(retry as i32);
        Duration::from_secs_f64(backoff.min(self.max_backoff.as_secs_f64()))
    }

    /// Whether a failed attempt (1-based) should be retried.
    pub fn should_retry(&self, error: &JobError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delays: Vec::new(),
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_delays_reuse_last_entry() {
        let policy = RetryPolicy::with_delays(
            3,
            vec![
                Duration::from_secs(30),
                Duration::from_secs(120),
                Duration::from_secs(300),
            ],
        );
        assert_eq!(policy.backoff(0), Duration::from_secs(30));
        assert_eq!(policy.backoff(1), Duration::from_secs(120));
        assert_eq!(policy.backoff(2), Duration::from_secs(300));
        assert_eq!(policy.backoff(7), Duration::from_secs(300));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            delays: vec![],
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.backoff(0), Duration::from_secs(60));
        assert_eq!(policy.backoff(2), Duration::from_secs(240));
        assert_eq!(policy.backoff(3), Duration::from_secs(300));
    }

    #[test]
    fn test_should_retry_respects_attempts_and_error_kind() {
        let policy = RetryPolicy::default();
        let failure = JobError::ExecutionFailed("boom".to_string());
        assert!(policy.should_retry(&failure, 1));
        assert!(policy.should_retry(&failure, 2));
        assert!(!policy.should_retry(&failure, 3));
        assert!(!policy.should_retry(&JobError::Cancelled, 1));
        assert!(!RetryPolicy::none().should_retry(&failure, 1));
    }
}
