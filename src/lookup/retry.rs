//! Retry Policy
//!
//! Bounded retry with capped exponential backoff and an injectable delay.

use std::time::Duration;

use async_trait::async_trait;

// == Retry Policy ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Upper bound on a server-indicated `Retry-After` wait
    pub retry_after_cap: Duration,
}

impl RetryPolicy {
    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retrying after the 0-based `attempt` failed.
    ///
    /// `base * 2^attempt`, capped at `backoff_max`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(16);
        self.backoff_base
            .saturating_mul(multiplier)
            .min(self.backoff_max)
    }

    /// Delay after a rate-limit answer: the server's hint if given, else backoff.
    pub fn rate_limit_wait(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(wait) => wait.min(self.retry_after_cap),
            None => self.backoff_for_attempt(attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
            retry_after_cap: Duration::from_secs(30),
        }
    }
}

// == Retry Delay ==
/// Waits between attempts.
#[async_trait]
pub trait RetryDelay: Send + Sync {
    async fn wait(&self, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl RetryDelay for TokioDelay {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
