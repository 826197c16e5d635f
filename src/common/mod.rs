//! Resilience building blocks shared by every backend
//!
//! - Circuit breaker pattern for fault tolerance
//! - Sliding-window rate limiter with a bounded FIFO queue
//! - Retry logic with exponential backoff

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limiter;

pub use backoff::{backoff_delay, with_backoff_if, with_exponential_backoff, BackoffPolicy};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerCore, CircuitBreakerStatus, CircuitState,
};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterStatus};
