//! Retry with exponential backoff and jitter
//!
//! Independent of the rate limiter and circuit breaker: it only re-invokes the
//! operation it is given. Wrap a `ResilientClient::call` in it to retry
//! transient upstream failures.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Total number of attempts, including the first one
    pub max_retries: u32,
    /// Delay before the first retry, before jitter
    pub base_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay_ms: base_delay.as_millis().min(u64::MAX as u128) as u64,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Delay before retry `attempt + 1` for a given jitter sample in `[0, 1)`.
///
/// `base_delay * 2^attempt * (0.5 + jitter * 0.5)`, saturating at `Duration::MAX`.
pub fn jittered_delay(attempt: u32, base_delay: Duration, jitter: f64) -> Duration {
    let exponential = 2f64.powi(attempt.min(62) as i32);
    let factor = exponential * (0.5 + jitter.clamp(0.0, 1.0) * 0.5);
    Duration::try_from_secs_f64(base_delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Delay before retry `attempt + 1` with a fresh random jitter sample
pub fn backoff_delay(attempt: u32, base_delay: Duration) -> Duration {
    let jitter: f64 = rand::thread_rng().gen();
    jittered_delay(attempt, base_delay, jitter)
}

/// Run `operation` up to `max_retries` times, sleeping with exponential
/// backoff between attempts.
///
/// When every attempt fails, the error from the last attempt is returned as is.
/// `max_retries` below 1 still makes one attempt.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use crypto_api_guard::common::with_exponential_backoff;
///
/// #[tokio::main]
/// async fn main() {
///     let body = with_exponential_backoff(
///         || async { reqwest::get("https://api.coingecko.com/api/v3/ping").await },
///         3,
///         Duration::from_secs(1),
///     )
///     .await;
///     println!("{:?}", body.is_ok());
/// }
/// ```
pub async fn with_exponential_backoff<F, Fut, T, E>(
    operation: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    with_backoff_if(operation, BackoffPolicy::new(max_retries, base_delay), |_| true).await
}

/// Like [`with_exponential_backoff`], but gives up as soon as `should_retry`
/// rejects an error, returning that error unchanged.
pub async fn with_backoff_if<F, Fut, T, E, P>(
    mut operation: F,
    policy: BackoffPolicy,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let attempts = policy.max_retries.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt + 1 >= attempts {
                    tracing::warn!("Giving up after {} attempts: {}", attempts, e);
                    return Err(e);
                }
                if !should_retry(&e) {
                    tracing::debug!("Not retrying: {}", e);
                    return Err(e);
                }

                let delay = backoff_delay(attempt, policy.base_delay());
                tracing::warn!(
                    "Request failed (attempt {}/{}): {}. Retrying in {}ms",
                    attempt + 1,
                    attempts,
                    e,
                    delay.as_millis()
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
