//! Status command - print the guard state of one or all backends

use anyhow::{Context, Result};
use crypto_api_guard::{GuardConfig, ResilientClient};
use std::path::PathBuf;
use tracing::info;

pub fn run(config_path: Option<PathBuf>, backend: Option<String>) -> Result<()> {
    let config = GuardConfig::load(config_path.as_deref()).context("Failed to load config")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async {
        let client = ResilientClient::new(&config)?;
        info!("Registered {} backends", client.backends().len());

        let json = match backend {
            Some(name) => serde_json::to_string_pretty(&client.status(&name).await?)?,
            None => serde_json::to_string_pretty(&client.status_all().await)?,
        };
        println!("{}", json);
        Ok::<(), anyhow::Error>(())
    })
}
