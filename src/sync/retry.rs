//! Exponential backoff for authority calls.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryPolicy;
use crate::error::AuthorityError;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max_delay`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    policy
        .base_delay
        .saturating_mul(1u32 << exponent)
        .min(policy.max_delay)
}

/// Whether a failed call is worth repeating. A malformed response will not
/// fix itself.
pub fn is_transient(err: &AuthorityError) -> bool {
    matches!(
        err,
        AuthorityError::Transport(_) | AuthorityError::Timeout(_)
    )
}

/// Run `call` until it succeeds, fails permanently, or the policy's attempts
/// are used up. Returns the last error.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut call: F,
) -> Result<T, AuthorityError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AuthorityError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match call(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && is_transient(&e) => {
                let delay = backoff_delay(policy, attempt);
                log::warn!(
                    "AUTHORITY_RETRY attempt={} max_attempts={} delay_ms={} error={}",
                    attempt,
                    max_attempts,
                    delay.as_millis(),
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
