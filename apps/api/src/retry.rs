//! Rate-limit backoff shared by every outbound collaborator.
//!
//! Only errors that report themselves as rate-limited are retried. Anything
//! else is returned on the spot, without waiting.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Implemented by collaborator errors so the backoff loop can tell a
/// rate-limit response apart from a fatal one.
pub trait Retryable {
    fn is_rate_limited(&self) -> bool;
}

/// Exponential backoff: the wait after failed attempt `n` (0-based) is
/// `base_secs^n` seconds. Uncapped, bounded only by `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_secs: u64,
}

impl BackoffPolicy {
    /// 1s, 2s, 4s, 8s between five attempts.
    pub const RATE_LIMIT: Self = Self {
        max_attempts: 5,
        base_secs: 2,
    };

    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.base_secs.saturating_pow(attempt))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::RATE_LIMIT
    }
}

/// Runs `op` until it succeeds, fails with a non-rate-limit error, or the
/// attempt budget is spent. The last error is returned as is.
pub async fn retry_rate_limited<T, E, F, Fut>(
    policy: BackoffPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() && attempt + 1 < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{label}: rate limited on attempt {}/{}, waiting {}s: {e}",
                    attempt + 1,
                    max_attempts,
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
