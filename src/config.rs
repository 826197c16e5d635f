//! Configuration management
//!
//! Backends are declared once, in a JSON file or via the built-in defaults,
//! and turned into one rate limiter + circuit breaker pair each.
//!
//! ```json
//! {
//!   "backends": {
//!     "binance": {
//!       "base_url": "https://api.binance.com/api/v3",
//!       "max_requests": 1200,
//!       "time_window_ms": 60000,
//!       "queue_size": 100,
//!       "failure_threshold": 5,
//!       "reset_timeout_ms": 30000
//!     }
//!   },
//!   "backoff": { "max_retries": 3, "base_delay_ms": 1000 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::common::{BackoffPolicy, CircuitBreakerConfig, RateLimiterConfig};
use crate::error::ConfigError;

/// Environment variable naming the config file when none is given explicitly
pub const CONFIG_PATH_ENV: &str = "CRYPTO_API_GUARD_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    pub backends: BTreeMap<String, BackendConfig>,
    #[serde(default)]
    pub backoff: BackoffPolicy,
}

impl GuardConfig {
    /// Load configuration from a JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GuardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, else from `$CRYPTO_API_GUARD_CONFIG`, else the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::Empty);
        }
        for (name, backend) in &self.backends {
            backend.validate(name)?;
        }
        Ok(())
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(
            "binance".to_string(),
            BackendConfig::new(1200, Duration::from_secs(60))
                .with_base_url("https://api.binance.com/api/v3")
                .with_queue_size(200)
                .with_breaker(5, Duration::from_secs(30)),
        );
        backends.insert(
            "coingecko".to_string(),
            BackendConfig::new(100, Duration::from_secs(60))
                .with_base_url("https://api.coingecko.com/api/v3")
                .with_queue_size(50)
                .with_breaker(3, Duration::from_secs(60)),
        );
        backends.insert(
            "cryptopanic".to_string(),
            BackendConfig::new(30, Duration::from_secs(60))
                .with_base_url("https://cryptopanic.com/api/v1")
                .with_queue_size(20)
                .with_breaker(3, Duration::from_secs(120)),
        );

        GuardConfig {
            backends,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Per-backend limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Prefix for relative request paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub max_requests: usize,
    pub time_window_ms: u64,
    pub queue_size: usize,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    #[serde(default = "default_half_open_probe_count")]
    pub half_open_probe_count: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_half_open_probe_count() -> u32 {
    3
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl BackendConfig {
    pub fn new(max_requests: usize, time_window: Duration) -> Self {
        Self {
            base_url: None,
            max_requests,
            time_window_ms: time_window.as_millis() as u64,
            queue_size: 100,
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            half_open_probe_count: default_half_open_probe_count(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_breaker(mut self, failure_threshold: u32, reset_timeout: Duration) -> Self {
        self.failure_threshold = failure_threshold;
        self.reset_timeout_ms = reset_timeout.as_millis() as u64;
        self
    }

    pub fn with_half_open_probe_count(mut self, probes: u32) -> Self {
        self.half_open_probe_count = probes;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::default()
            .with_max_requests(self.max_requests)
            .with_time_window(Duration::from_millis(self.time_window_ms))
            .with_queue_size(self.queue_size)
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
            .with_failure_threshold(self.failure_threshold)
            .with_reset_timeout(Duration::from_millis(self.reset_timeout_ms))
            .with_half_open_probe_count(self.half_open_probe_count)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            backend: name.to_string(),
            message: message.to_string(),
        };

        if name.trim().is_empty() {
            return Err(invalid("backend name must not be empty"));
        }
        if self.max_requests == 0 {
            return Err(invalid("max_requests must be positive"));
        }
        if self.time_window_ms == 0 {
            return Err(invalid("time_window_ms must be positive"));
        }
        if self.queue_size == 0 {
            return Err(invalid("queue_size must be positive"));
        }
        if self.failure_threshold == 0 {
            return Err(invalid("failure_threshold must be positive"));
        }
        if self.half_open_probe_count == 0 {
            return Err(invalid("half_open_probe_count must be positive"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backends() {
        let config = GuardConfig::default();
        config.validate().unwrap();

        let names: Vec<_> = config.backends.keys().cloned().collect();
        assert_eq!(names, vec!["binance", "coingecko", "cryptopanic"]);
        assert_eq!(config.backends["binance"].max_requests, 1200);
        assert_eq!(config.backends["coingecko"].max_requests, 100);
        assert_eq!(config.backends["cryptopanic"].max_requests, 30);
        assert_eq!(config.backends["cryptopanic"].time_window_ms, 60_000);
    }

    #[test]
    fn test_parse_with_defaults() {
        let json = r#"{
            "backends": {
                "kraken": {
                    "max_requests": 15,
                    "time_window_ms": 1000,
                    "queue_size": 5,
                    "failure_threshold": 2,
                    "reset_timeout_ms": 5000
                }
            }
        }"#;
        let config = GuardConfig::from_json_str(json).unwrap();
        let kraken = &config.backends["kraken"];

        assert_eq!(kraken.half_open_probe_count, 3);
        assert_eq!(kraken.request_timeout(), Duration::from_secs(10));
        assert_eq!(kraken.base_url, None);
        assert_eq!(config.backoff, BackoffPolicy::default());

        let limiter = kraken.rate_limiter_config();
        assert_eq!(limiter.max_requests, 15);
        assert_eq!(limiter.time_window, Duration::from_secs(1));
        assert_eq!(limiter.queue_size, 5);

        let breaker = kraken.circuit_breaker_config();
        assert_eq!(breaker.failure_threshold, 2);
        assert_eq!(breaker.reset_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_zero_limits() {
        let json = r#"{
            "backends": {
                "kraken": {
                    "max_requests": 0,
                    "time_window_ms": 1000,
                    "queue_size": 5,
                    "failure_threshold": 2,
                    "reset_timeout_ms": 5000
                }
            }
        }"#;
        match GuardConfig::from_json_str(json) {
            Err(ConfigError::Invalid { backend, message }) => {
                assert_eq!(backend, "kraken");
                assert!(message.contains("max_requests"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_backends() {
        let result = GuardConfig::from_json_str(r#"{"backends": {}}"#);
        assert!(matches!(result, Err(ConfigError::Empty)));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let result = GuardConfig::from_json_str("{ backends: ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/guard.json");
        assert_eq!(GuardConfig::from_file(path).unwrap(), GuardConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let result = GuardConfig::from_file("configs/does_not_exist.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_json_roundtrip_of_defaults() {
        let config = GuardConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert_eq!(GuardConfig::from_json_str(&json).unwrap(), config);
    }
}
