//! Check-config command - validate settings and list backends

use anyhow::{Context, Result};
use crypto_api_guard::GuardConfig;
use std::path::PathBuf;
use tracing::info;

pub fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = GuardConfig::load(config_path.as_deref()).context("Invalid configuration")?;
    info!("Configuration OK");

    println!("\n{}", "=".repeat(72));
    println!(
        "{:<14} {:>8} {:>10} {:>6} {:>10} {:>10} {:>7}",
        "BACKEND", "MAX", "WINDOW", "QUEUE", "THRESHOLD", "RESET", "PROBES"
    );
    println!("{}", "=".repeat(72));
    for (name, backend) in &config.backends {
        println!(
            "{:<14} {:>8} {:>8}ms {:>6} {:>10} {:>8}ms {:>7}",
            name,
            backend.max_requests,
            backend.time_window_ms,
            backend.queue_size,
            backend.failure_threshold,
            backend.reset_timeout_ms,
            backend.half_open_probe_count
        );
    }
    println!("{}", "=".repeat(72));
    println!(
        "Backoff: {} attempts, base delay {}ms\n",
        config.backoff.max_retries, config.backoff.base_delay_ms
    );

    Ok(())
}
