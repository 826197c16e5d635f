//! Crypto API Guard
//!
//! Protects a crypto market dashboard's outbound API calls (exchange tickers,
//! price feeds, news aggregators) from exceeding third-party quotas and from
//! cascading failures when an upstream degrades.
//!
//! Each named backend gets:
//! - **Circuit breaker**: stops calling a failing backend, then probes recovery
//! - **Rate limiter**: sliding-window admission with a bounded FIFO queue
//!
//! and an independent **exponential backoff** helper can be wrapped around any
//! call.
//!
//! ## Example
//! ```no_run
//! use std::time::Duration;
//! use crypto_api_guard::common::{with_backoff_if, BackoffPolicy};
//! use crypto_api_guard::{ApiError, GuardConfig, ResilientClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ResilientClient::new(&GuardConfig::default())?;
//!
//!     let price: serde_json::Value = with_backoff_if(
//!         || client.get_json("binance", "/ticker/price?symbol=BTCUSDT"),
//!         BackoffPolicy::new(3, Duration::from_secs(1)),
//!         ApiError::is_retryable,
//!     )
//!     .await?;
//!     println!("BTCUSDT: {}", price["price"]);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod common;
pub mod config;
pub mod error;
pub mod http;

pub use client::{ResilientClient, StatusReport};
pub use config::{BackendConfig, GuardConfig};
pub use error::{ApiError, ApiResult, ConfigError};
