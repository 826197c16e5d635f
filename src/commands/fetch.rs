//! Fetch command - one guarded GET, optionally retried with backoff

use anyhow::{Context, Result};
use crypto_api_guard::common::{with_backoff_if, BackoffPolicy};
use crypto_api_guard::{ApiError, GuardConfig, ResilientClient};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub fn run(
    config_path: Option<PathBuf>,
    backend: String,
    path: String,
    retries: Option<u32>,
    base_delay_ms: Option<u64>,
) -> Result<()> {
    let config = GuardConfig::load(config_path.as_deref()).context("Failed to load config")?;

    let policy = BackoffPolicy::new(
        retries.unwrap_or(config.backoff.max_retries),
        base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.backoff.base_delay()),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config, backend, path, policy))
}

async fn run_async(
    config: GuardConfig,
    backend: String,
    path: String,
    policy: BackoffPolicy,
) -> Result<()> {
    let client = ResilientClient::new(&config)?;
    info!(
        "Fetching {} from {} ({} attempts max)",
        path, backend, policy.max_retries
    );

    let result: Result<serde_json::Value, ApiError> = with_backoff_if(
        || client.get_json(&backend, &path),
        policy,
        ApiError::is_retryable,
    )
    .await;

    let status = client.status(&backend).await?;

    match result {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            info!(
                "Circuit {:?}, {}/{} admissions in window",
                status.circuit_breaker.state, status.rate_limiter.active, status.rate_limiter.max
            );
            Ok(())
        }
        Err(e) => {
            warn!("Status after failure: {}", serde_json::to_string(&status)?);
            Err(e).with_context(|| format!("Request to {} failed", backend))
        }
    }
}
