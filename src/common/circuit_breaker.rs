//! Circuit Breaker pattern implementation for fault tolerance
//!
//! The circuit breaker stops calling a failing backend for a cooldown period,
//! then lets a limited number of probe calls through to test recovery.
//!
//! States:
//! - Closed: Normal operation, calls pass through
//! - Open: Backend is failing, calls are rejected without being attempted
//! - HalfOpen: Cooldown elapsed, probe calls decide between Closed and Open
//!
//! ```text
//! Closed   --failure_count >= failure_threshold--> Open
//! Open     --now >= next_attempt (on next call)--> HalfOpen
//! HalfOpen --half_open_probe_count successes-----> Closed
//! HalfOpen --any failure-------------------------> Open
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{ApiError, ApiResult};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    #[default]
    Closed,
    /// Backend is failing - calls are rejected immediately
    Open,
    /// Testing if backend has recovered
    HalfOpen,
}

/// Configuration for the circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Duration to stay in Open state before probing
    pub reset_timeout: Duration,
    /// Number of consecutive successes in HalfOpen state before closing
    pub half_open_probe_count: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_probe_count: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_half_open_probe_count(mut self, probes: u32) -> Self {
        self.half_open_probe_count = probes;
        self
    }
}

/// Point-in-time view of a circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStatus {
    pub state: CircuitState,
    pub failure_count: u32,
    /// Only meaningful in HalfOpen
    pub success_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
}

/// Admission outcome of [`CircuitBreakerCore::try_acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed; its outcome must be recorded with this epoch
    Allowed { epoch: u64 },
    /// The circuit is open for at least `retry_after` more
    Rejected { retry_after: Duration },
}

/// Synchronous circuit breaker state machine
///
/// Every method takes `now` explicitly so transitions are deterministic.
/// Each state transition bumps an epoch; outcomes reported with an older
/// epoch belong to calls admitted before the transition and are ignored.
#[derive(Debug)]
pub struct CircuitBreakerCore {
    name: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    epoch: u64,
    next_attempt: Option<Instant>,
    next_attempt_time: Option<DateTime<Utc>>,
    last_failure_time: Option<DateTime<Utc>>,
}

impl CircuitBreakerCore {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            epoch: 0,
            next_attempt: None,
            next_attempt_time: None,
            last_failure_time: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Gate check for a new call.
    ///
    /// An open circuit whose cooldown has elapsed moves to HalfOpen here, and
    /// the call doing the check becomes the first probe.
    pub fn try_acquire(&mut self, now: Instant) -> Admission {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => Admission::Allowed { epoch: self.epoch },
            CircuitState::Open => {
                let next_attempt = self.next_attempt.unwrap_or(now);
                if now >= next_attempt {
                    tracing::info!(backend = %self.name, "Circuit breaker transitioning to HalfOpen state");
                    self.state = CircuitState::HalfOpen;
                    self.success_count = 0;
                    self.epoch += 1;
                    Admission::Allowed { epoch: self.epoch }
                } else {
                    Admission::Rejected {
                        retry_after: next_attempt - now,
                    }
                }
            }
        }
    }

    /// Record a successful call admitted under `epoch`
    pub fn record_success(&mut self, epoch: u64) {
        if epoch != self.epoch {
            tracing::debug!(backend = %self.name, "Ignoring success from a call admitted before the last transition");
            return;
        }

        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.config.half_open_probe_count {
                    tracing::info!(backend = %self.name, "Circuit breaker closed after successful recovery");
                    self.close();
                } else {
                    tracing::debug!(
                        backend = %self.name,
                        "Probe succeeded ({}/{})",
                        self.success_count,
                        self.config.half_open_probe_count
                    );
                }
            }
            // No call is ever admitted while Open
            CircuitState::Open => {}
        }
    }

    /// Record a failed call admitted under `epoch`
    pub fn record_failure(&mut self, epoch: u64, now: Instant) {
        if epoch != self.epoch {
            tracing::debug!(backend = %self.name, "Ignoring failure from a call admitted before the last transition");
            return;
        }

        self.last_failure_time = Some(Utc::now());

        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        backend = %self.name,
                        "Circuit breaker opened after {} failures",
                        self.failure_count
                    );
                    self.open(now);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(backend = %self.name, "Circuit breaker re-opened due to failure in HalfOpen state");
                self.open(now);
            }
            CircuitState::Open => {}
        }
    }

    /// Force Closed with all counters zeroed
    pub fn reset(&mut self) {
        self.close();
        self.last_failure_time = None;
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        CircuitBreakerStatus {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            last_failure_time: self.last_failure_time,
            next_attempt_time: self.next_attempt_time,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.success_count = 0;
        self.next_attempt = Some(now + self.config.reset_timeout);
        self.next_attempt_time = Some(wall_clock_after(self.config.reset_timeout));
        self.epoch += 1;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.next_attempt = None;
        self.next_attempt_time = None;
        self.epoch += 1;
    }
}

fn wall_clock_after(delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| Utc::now().checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Shared, async circuit breaker guarding one backend
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use crypto_api_guard::common::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
/// use crypto_api_guard::ApiError;
///
/// #[tokio::main]
/// async fn main() {
///     let config = CircuitBreakerConfig::default()
///         .with_failure_threshold(1)
///         .with_reset_timeout(Duration::from_secs(30));
///     let breaker = CircuitBreaker::new("coingecko", config);
///
///     let result: Result<(), ApiError> = breaker
///         .execute(|| async { Err(ApiError::Network("connection reset".into())) })
///         .await;
///     assert!(result.is_err());
///     assert_eq!(breaker.status().await.state, CircuitState::Open);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    core: Arc<Mutex<CircuitBreakerCore>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name: String = name.into();
        Self {
            core: Arc::new(Mutex::new(CircuitBreakerCore::new(name.clone(), config))),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` if the circuit admits it, recording the outcome.
    ///
    /// The operation's result is returned unchanged. While Open the operation
    /// is never invoked and `ApiError::CircuitOpen` is returned instead.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ApiResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let epoch = self.acquire().await?;

        let result = operation().await;

        let mut core = self.core.lock().await;
        match &result {
            Ok(_) => core.record_success(epoch),
            Err(_) => core.record_failure(epoch, Instant::now()),
        }

        result
    }

    async fn acquire(&self) -> ApiResult<u64> {
        let mut core = self.core.lock().await;
        match core.try_acquire(Instant::now()) {
            Admission::Allowed { epoch } => Ok(epoch),
            Admission::Rejected { retry_after } => Err(ApiError::CircuitOpen {
                backend: self.name.to_string(),
                next_attempt_time: core
                    .next_attempt_time
                    .unwrap_or_else(|| wall_clock_after(retry_after)),
                retry_after,
            }),
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.core.lock().await.state()
    }

    pub async fn status(&self) -> CircuitBreakerStatus {
        self.core.lock().await.status()
    }

    pub async fn reset(&self) {
        self.core.lock().await.reset();
        tracing::info!(backend = %self.name, "Circuit breaker reset");
    }
}
