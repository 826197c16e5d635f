//! Sliding-window rate limiter with a bounded FIFO queue
//!
//! Keeps exchange and price-feed calls within their published quotas: at most
//! `max_requests` admissions in any rolling `time_window`. Calls that arrive
//! while the window is full wait in a bounded queue and are released in FIFO
//! order by a background drain task, one at most every
//! `time_window / max_requests`.

use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::time::{sleep_until, Instant};

use crate::error::{ApiError, ApiResult};

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum admissions within one time window
    pub max_requests: usize,
    /// Length of the rolling window
    pub time_window: Duration,
    /// Maximum number of calls waiting for a slot
    pub queue_size: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            time_window: Duration::from_secs(1),
            queue_size: 100,
        }
    }
}

impl RateLimiterConfig {
    pub fn with_max_requests(mut self, max_requests: usize) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_time_window(mut self, window: Duration) -> Self {
        self.time_window = window;
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Minimum spacing between two admissions made by the drain task
    pub fn drain_interval(&self) -> Duration {
        self.time_window.div_f64(self.max_requests.max(1) as f64)
    }
}

/// Point-in-time view of a rate limiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimiterStatus {
    /// Admissions inside the current window
    pub active: usize,
    pub max: usize,
    pub queued: usize,
    pub available: bool,
}

#[derive(Debug, Default)]
struct LimiterState {
    admissions: VecDeque<Instant>,
    queue: VecDeque<oneshot::Sender<()>>,
    last_drain: Option<Instant>,
    draining: bool,
}

impl LimiterState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.admissions.front() {
            if now.duration_since(oldest) >= window {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
        // Waiters whose callers gave up
        self.queue.retain(|tx| !tx.is_closed());
    }
}

#[derive(Debug)]
struct Shared {
    name: String,
    config: RateLimiterConfig,
    state: Mutex<LimiterState>,
    wake: Notify,
}

/// Rate limiter guarding one backend
///
/// Clones share the same window and queue.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use crypto_api_guard::common::{RateLimiter, RateLimiterConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let config = RateLimiterConfig::default()
///         .with_max_requests(100)
///         .with_time_window(Duration::from_secs(60));
///     let limiter = RateLimiter::new("coingecko", config);
///
///     let price = limiter.execute(|| async { Ok(64_250.5) }).await.unwrap();
///     assert_eq!(price, 64_250.5);
///     assert_eq!(limiter.status().await.active, 1);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                config,
                state: Mutex::new(LimiterState::default()),
                wake: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.shared.config
    }

    /// Run `operation` once a slot in the window is available.
    ///
    /// Fails fast with `ApiError::QueueFull` instead of waiting when the queue
    /// is at capacity. The operation's own result is returned unchanged.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ApiResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        self.acquire().await?;
        operation().await
    }

    /// Wait for an admission slot without running anything
    pub async fn acquire(&self) -> ApiResult<()> {
        let config = &self.shared.config;

        let admitted = {
            let mut state = self.shared.state.lock().await;
            let now = Instant::now();
            state.prune(now, config.time_window);

            // Queued callers go first
            if state.queue.is_empty() && state.admissions.len() < config.max_requests {
                state.admissions.push_back(now);
                return Ok(());
            }

            if state.queue.len() >= config.queue_size {
                tracing::warn!(
                    backend = %self.shared.name,
                    queued = state.queue.len(),
                    "Rate limiter queue full, rejecting call"
                );
                return Err(ApiError::QueueFull {
                    backend: self.shared.name.clone(),
                    queue_size: config.queue_size,
                });
            }

            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);
            tracing::debug!(
                backend = %self.shared.name,
                queued = state.queue.len(),
                "Rate limit reached, call queued"
            );

            if !state.draining {
                state.draining = true;
                tokio::spawn(drain(Arc::clone(&self.shared)));
            }

            rx
        };

        admitted.await.map_err(|_| ApiError::QueueCancelled {
            backend: self.shared.name.clone(),
        })
    }

    pub async fn status(&self) -> RateLimiterStatus {
        let mut state = self.shared.state.lock().await;
        state.prune(Instant::now(), self.shared.config.time_window);
        let active = state.admissions.len();
        RateLimiterStatus {
            active,
            max: self.shared.config.max_requests,
            queued: state.queue.len(),
            available: active < self.shared.config.max_requests,
        }
    }

    /// Clear the admission history and drop every queued call.
    ///
    /// Callers waiting in the queue get `ApiError::QueueCancelled`.
    pub async fn reset(&self) {
        let dropped = {
            let mut state = self.shared.state.lock().await;
            state.admissions.clear();
            state.last_drain = None;
            let dropped = state.queue.len();
            state.queue.clear();
            dropped
        };
        self.shared.wake.notify_one();
        tracing::info!(backend = %self.shared.name, dropped, "Rate limiter reset");
    }
}

/// Releases queued callers in FIFO order until the queue is empty.
async fn drain(shared: Arc<Shared>) {
    let window = shared.config.time_window;
    let max = shared.config.max_requests;
    let interval = shared.config.drain_interval();

    loop {
        let wake_at = {
            let mut state = shared.state.lock().await;
            let now = Instant::now();
            state.prune(now, window);

            if state.queue.is_empty() {
                state.draining = false;
                return;
            }

            let paced = state.last_drain.map_or(true, |at| now >= at + interval);
            if paced && state.admissions.len() < max {
                while let Some(tx) = state.queue.pop_front() {
                    if tx.send(()).is_ok() {
                        state.admissions.push_back(now);
                        state.last_drain = Some(now);
                        break;
                    }
                }
                continue;
            }

            let mut wake_at = state.last_drain.map_or(now, |at| at + interval);
            if state.admissions.len() >= max {
                let oldest_blocking = state.admissions[state.admissions.len() - max];
                wake_at = wake_at.max(oldest_blocking + window);
            }
            wake_at
        };

        tokio::select! {
            _ = sleep_until(wake_at) => {}
            _ = shared.wake.notified() => {}
        }
    }
}
