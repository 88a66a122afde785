// Retry logic with exponential backoff

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use super::error::{GatewayError, ProviderError};
use crate::metrics;

/// Bounded exponential backoff for transient backend failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failure number `failed_attempt` (1-based)
    pub fn delay_for(&self, failed_attempt: u32, error: &ProviderError) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay_ms
            .saturating_mul(2u64.pow(exp))
            .min(self.max_delay_ms);
        let delay = error
            .retry_after_ms()
            .map_or(backoff, |ra| backoff.max(ra.min(self.max_delay_ms)));
        Duration::from_millis(delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Decide what to do after a failed attempt
pub(crate) enum RetryDecision {
    Retry(Duration),
    GiveUp(GatewayError),
}

pub(crate) fn decide(policy: &RetryPolicy, attempt: u32, error: ProviderError) -> RetryDecision {
    if matches!(error, ProviderError::Cancelled) {
        return RetryDecision::GiveUp(GatewayError::Cancelled);
    }
    if !error.is_retryable() {
        metrics::record_backend_fatal(error.category());
        tracing::error!(
            alert = "backend_misconfigured",
            category = error.category(),
            "Backend call failed without retry: {}",
            error
        );
        return RetryDecision::GiveUp(GatewayError::Fatal(error));
    }
    if attempt >= policy.max_attempts() {
        tracing::warn!(
            attempts = attempt,
            category = error.category(),
            "Backend still failing after {} attempt(s): {}",
            attempt,
            error
        );
        return RetryDecision::GiveUp(GatewayError::UpstreamUnavailable {
            attempts: attempt,
            source: error,
        });
    }
    let delay = policy.delay_for(attempt, &error);
    metrics::record_backend_retry(error.category());
    tracing::warn!(
        "Backend request failed (attempt {}/{}): {}, retrying in {:?}",
        attempt,
        policy.max_attempts(),
        error,
        delay
    );
    RetryDecision::Retry(delay)
}

/// Execute `f` with exponential backoff. `f` receives the 1-based attempt number.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut f: F) -> Result<T, GatewayError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => match decide(policy, attempt, e) {
                RetryDecision::Retry(delay) => sleep(delay).await,
                RetryDecision::GiveUp(err) => return Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 500,
        };
        let e = ProviderError::Timeout;
        assert_eq!(policy.delay_for(1, &e), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2, &e), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3, &e), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4, &e), Duration::from_millis(500));
    }

    #[test]
    fn test_delay_respects_retry_after() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        };
        let e = ProviderError::RateLimited {
            retry_after_ms: Some(2_000),
        };
        assert_eq!(policy.delay_for(1, &e), Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(ProviderError::Connection("refused".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_upstream_unavailable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Timeout) }
        })
        .await;
        assert!(matches!(
            result,
            Err(GatewayError::UpstreamUnavailable { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::Auth {
                    status: 401,
                    body: "bad key".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(GatewayError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
