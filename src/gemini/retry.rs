//! Retry and backoff for rate-limited generative calls.
//!
//! The video service enforces a low per-minute quota, so the delays here are
//! deliberately long: 20s before the second attempt, doubling each retry.

use std::future::Future;
use std::time::Duration;

/// Total attempts (including the first) for a rate-limited call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Delay before the second attempt; doubles for each attempt after that.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(20);

/// Backoff policy for one category of remote call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after a failed `attempt` (1-based):
    /// `initial_delay * 2^(attempt - 1)`, i.e. 20s, 40s, 80s with defaults.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Execute `op`, retrying transient failures with exponential backoff.
///
/// `classify` decides whether a failure is transient; fatal failures and the
/// final exhausted failure are returned to the caller unchanged. Retried
/// operations must be idempotent from the caller's point of view.
pub async fn call_with_retry<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    classify: C,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if classify(&e) && attempt < max_attempts => {
                let delay = policy.delay_after_attempt(attempt);
                log::warn!(
                    "Transient failure on attempt {}/{}: {}. Retrying in {:?}...",
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if attempt >= max_attempts && classify(&e) {
                    log::error!("Giving up after {} attempts: {}", attempt, e);
                }
                return Err(e);
            }
        }
    }
}

/// Parse a Retry-After header into seconds, when the service sends one.
/// Only the integer-seconds form is handled; the value is logged for
/// observability but never overrides the policy's delay schedule.
pub fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
}
