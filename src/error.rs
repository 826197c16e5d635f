//! Error types for guarded API calls
//!
//! `ApiError` covers both failures synthesized locally by the rate limiter and
//! circuit breaker (the wrapped call never ran) and failures reported by the
//! wrapped network call itself.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by guarded calls
#[derive(Debug, Error)]
pub enum ApiError {
    /// The rate limiter queue was already full when the call needed to wait
    #[error("rate limiter queue full for backend '{backend}' ({queue_size} waiting)")]
    QueueFull { backend: String, queue_size: usize },

    /// The call was waiting in the rate limiter queue when the limiter was reset
    #[error("queued call to backend '{backend}' cancelled by reset")]
    QueueCancelled { backend: String },

    /// The circuit breaker is open; the call was not attempted
    #[error("circuit open for backend '{backend}', next attempt at {next_attempt_time}")]
    CircuitOpen {
        backend: String,
        next_attempt_time: DateTime<Utc>,
        retry_after: Duration,
    },

    /// No backend with this name is registered
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// Upstream answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The wrapped call exceeded its own deadline
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure (DNS, connection reset, TLS, ...)
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The registry was built from an invalid configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// Whether retrying the same call later might succeed.
    ///
    /// Rejections that reflect a deliberate decision (open circuit, unknown
    /// backend, 4xx other than 429) are not retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::QueueFull { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::QueueCancelled { .. }
            | Self::CircuitOpen { .. }
            | Self::UnknownBackend(_)
            | Self::Decode(_)
            | Self::Config(_)
            | Self::Other(_) => false,
        }
    }

    /// True when the error was produced locally without invoking the wrapped call
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. }
                | Self::QueueCancelled { .. }
                | Self::CircuitOpen { .. }
                | Self::UnknownBackend(_)
        )
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Configuration problems detected while loading or validating settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("backend '{backend}': {message}")]
    Invalid { backend: String, message: String },

    #[error("no backends configured")]
    Empty,
}
