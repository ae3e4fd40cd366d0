//! Per-provider throttling and the retry policy for provider calls.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::num::NonZeroU32;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;

use crate::{Error, Result};

/// Deadline applied to every provider call. Streaming reads carry their own
/// idle timeout instead.
pub const PROVIDER_CALL_TIMEOUT: Duration = Duration::from_secs(30);

const RETRY_MIN_DELAY: Duration = Duration::from_secs(1);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
/// 5 attempts total for rate-limited calls.
const RATE_LIMIT_RETRIES: usize = 4;

/// Rate limiter shared by all requests of one provider instance.
pub struct Throttler {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl Throttler {
    #[must_use]
    pub fn new(requests_per_second: u32) -> Self {
        let quota = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1_u32));
        Self {
            limiter: RateLimiter::direct(Quota::per_second(quota)),
        }
    }

    /// Wait until the next request is allowed.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for Throttler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttler").finish()
    }
}

/// Run a provider call under the standard policy: a 30 s deadline per
/// attempt, exponential backoff on `RateLimited` (up to 5 attempts) and a
/// single retry for transient unavailability/IO errors.
pub async fn with_provider_policy<T, F, Fut>(operation: &str, mut factory: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let transient_budget = AtomicU32::new(1_u32);

    let attempt = || {
        // build the inner future before entering the async block so the
        // retry wrapper can call this again without borrowing issues
        let call = factory();
        async move {
            tokio::time::timeout(PROVIDER_CALL_TIMEOUT, call)
                .await
                .map_err(|_| Error::ProviderUnavailable(format!("{operation} timed out")))?
        }
    };

    attempt
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(RETRY_MIN_DELAY)
                .with_max_delay(RETRY_MAX_DELAY)
                .with_max_times(RATE_LIMIT_RETRIES),
        )
        .when(|err: &Error| match err {
            Error::RateLimited(_) => true,
            Error::ProviderUnavailable(_) | Error::Io(_) => {
                let left = transient_budget.load(Ordering::SeqCst);
                if left == 0 {
                    return false;
                }
                transient_budget.store(left - 1, Ordering::SeqCst);
                true
            }
            _ => false,
        })
        .notify(|err: &Error, delay: Duration| {
            tracing::debug!(%err, ?delay, operation, "retrying provider call");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_retries_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = with_provider_policy("search", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::RateLimited("slow down".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<u32> = with_provider_policy("get_track", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::ProviderUnavailable("down".to_string()))
            }
        })
        .await;
        assert!(matches!(result, Err(Error::ProviderUnavailable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_found_never_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<u32> = with_provider_policy("get_track", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::MediaNotFound("gone".to_string()))
            }
        })
        .await;
        assert!(matches!(result, Err(Error::MediaNotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_throttler_allows_requests() {
        let throttler = Throttler::new(100);
        throttler.acquire().await;
        throttler.acquire().await;
    }
}
