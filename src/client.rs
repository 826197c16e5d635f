//! Resilient API client
//!
//! A registry of named backends, each guarded by its own circuit breaker and
//! rate limiter:
//!
//! ```text
//! call(backend, f) -> CircuitBreaker -> RateLimiter -> f()
//! ```
//!
//! The breaker sits outside the limiter, so an open circuit never touches the
//! limiter's bookkeeping and a full limiter queue counts as a breaker failure.
//! Build one client at startup and hand clones to every caller; clones share
//! the same guards.
//!
//! # Example
//!
//! ```no_run
//! use crypto_api_guard::{GuardConfig, ResilientClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ResilientClient::new(&GuardConfig::default())?;
//!     let ping: serde_json::Value = client.get_json("coingecko", "/ping").await?;
//!     println!("{}", ping);
//!     println!("{:?}", client.status("coingecko").await?);
//!     Ok(())
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{CircuitBreaker, CircuitBreakerStatus, RateLimiter, RateLimiterStatus};
use crate::config::{BackendConfig, GuardConfig};
use crate::error::{ApiError, ApiResult};
use crate::http;

/// Combined status of one backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub rate_limiter: RateLimiterStatus,
    pub circuit_breaker: CircuitBreakerStatus,
}

#[derive(Debug)]
struct Backend {
    base_url: Option<String>,
    request_timeout: Duration,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
}

impl Backend {
    fn new(name: &str, config: &BackendConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            request_timeout: config.request_timeout(),
            limiter: RateLimiter::new(name, config.rate_limiter_config()),
            breaker: CircuitBreaker::new(name, config.circuit_breaker_config()),
        }
    }

    async fn status(&self) -> StatusReport {
        StatusReport {
            rate_limiter: self.limiter.status().await,
            circuit_breaker: self.breaker.status().await,
        }
    }

    async fn reset(&self) {
        self.breaker.reset().await;
        self.limiter.reset().await;
    }
}

/// Guarded access to a fixed set of named backends
#[derive(Debug, Clone)]
pub struct ResilientClient {
    backends: Arc<BTreeMap<String, Backend>>,
    http_client: reqwest::Client,
}

impl ResilientClient {
    /// Create the registry; every backend in `config` gets its own guards
    pub fn new(config: &GuardConfig) -> ApiResult<Self> {
        config.validate()?;

        let backends = config
            .backends
            .iter()
            .map(|(name, backend)| {
                tracing::debug!(
                    backend = %name,
                    max_requests = backend.max_requests,
                    time_window_ms = backend.time_window_ms,
                    failure_threshold = backend.failure_threshold,
                    "Registering backend"
                );
                (name.clone(), Backend::new(name, backend))
            })
            .collect();

        Ok(Self {
            backends: Arc::new(backends),
            http_client: http::build_client()?,
        })
    }

    /// Registered backend names, sorted
    pub fn backends(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    fn backend(&self, name: &str) -> ApiResult<&Backend> {
        self.backends
            .get(name)
            .ok_or_else(|| ApiError::UnknownBackend(name.to_string()))
    }

    /// Run `operation` against `backend` under its circuit breaker and rate limiter.
    ///
    /// Errors from `operation` are returned unchanged.
    pub async fn call<F, Fut, T>(&self, backend: &str, operation: F) -> ApiResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let guards = self.backend(backend)?;
        guards
            .breaker
            .execute(|| guards.limiter.execute(operation))
            .await
    }

    /// GET a JSON document from `backend`.
    ///
    /// `path` is joined to the backend's `base_url` unless it is already an
    /// absolute URL. The request runs under the backend's request timeout.
    pub async fn get_json<T>(&self, backend: &str, path: &str) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let guards = self.backend(backend)?;
        let url = http::join_url(guards.base_url.as_deref(), path);
        let timeout = guards.request_timeout;
        let client = &self.http_client;

        self.call(backend, || http::fetch_json(client, &url, timeout))
            .await
    }

    pub async fn status(&self, backend: &str) -> ApiResult<StatusReport> {
        Ok(self.backend(backend)?.status().await)
    }

    /// Status of every registered backend
    pub async fn status_all(&self) -> BTreeMap<String, StatusReport> {
        let mut reports = BTreeMap::new();
        for (name, backend) in self.backends.iter() {
            reports.insert(name.clone(), backend.status().await);
        }
        reports
    }

    /// Reset one backend's circuit breaker and rate limiter
    pub async fn reset(&self, backend: &str) -> ApiResult<()> {
        self.backend(backend)?.reset().await;
        Ok(())
    }

    pub async fn reset_all(&self) {
        for backend in self.backends.values() {
            backend.reset().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CircuitState;

    fn client() -> ResilientClient {
        let mut config = GuardConfig::default();
        config.backends.insert(
            "flaky".to_string(),
            BackendConfig::new(2, Duration::from_secs(1))
                .with_queue_size(1)
                .with_breaker(2, Duration::from_secs(30)),
        );
        ResilientClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_registry_lists_backends() {
        let client = client();
        assert_eq!(
            client.backends(),
            vec!["binance", "coingecko", "cryptopanic", "flaky"]
        );
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let client = client();
        let result = client.call("kraken", || async { Ok(1) }).await;
        assert!(matches!(result, Err(ApiError::UnknownBackend(name)) if name == "kraken"));
        assert!(matches!(
            client.status("kraken").await,
            Err(ApiError::UnknownBackend(_))
        ));
        assert!(client.reset("kraken").await.is_err());
    }

    #[tokio::test]
    async fn test_call_records_admission() {
        let client = client();
        let value = client.call("binance", || async { Ok("pong") }).await.unwrap();
        assert_eq!(value, "pong");

        let status = client.status("binance").await.unwrap();
        assert_eq!(status.rate_limiter.active, 1);
        assert_eq!(status.rate_limiter.max, 1200);
        assert_eq!(status.circuit_breaker.state, CircuitState::Closed);

        // Other backends are untouched
        let other = client.status("coingecko").await.unwrap();
        assert_eq!(other.rate_limiter.active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_rate_limiter() {
        let client = client();
        for _ in 0..2 {
            let _ = client
                .call("flaky", || async { Err::<(), _>(ApiError::Network("reset".into())) })
                .await;
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        let result = client.call("flaky", || async { Ok(()) }).await;
        assert!(matches!(result, Err(ApiError::CircuitOpen { .. })));

        let status = client.status("flaky").await.unwrap();
        assert_eq!(status.circuit_breaker.state, CircuitState::Open);
        assert_eq!(status.rate_limiter.active, 0);
    }

    #[tokio::test]
    async fn test_clones_share_guards() {
        let client = client();
        let other = client.clone();
        other.call("coingecko", || async { Ok(()) }).await.unwrap();
        assert_eq!(
            client.status("coingecko").await.unwrap().rate_limiter.active,
            1
        );
    }

    #[tokio::test]
    async fn test_status_all_covers_every_backend() {
        let client = client();
        let reports = client.status_all().await;
        assert_eq!(reports.len(), 4);
        assert!(reports.values().all(|r| r.rate_limiter.available));
    }
}
