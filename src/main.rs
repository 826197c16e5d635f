//! Crypto API guard - operator entry point
//!
//! This binary provides three subcommands:
//! - status: Print the rate limiter / circuit breaker status of every backend
//! - fetch: Perform one guarded GET against a backend
//! - check-config: Validate a configuration file and list its backends

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "crypto-api-guard")]
#[command(about = "Rate limiting and circuit breaking for crypto market-data APIs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults to $CRYPTO_API_GUARD_CONFIG, then built-in backends)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print backend status as JSON
    Status {
        /// Only this backend
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// GET a JSON document through a backend's guards
    Fetch {
        /// Backend name, e.g. "binance"
        #[arg(short, long)]
        backend: String,

        /// Path relative to the backend's base_url, or an absolute URL
        #[arg(short, long)]
        path: String,

        /// Attempts with exponential backoff (overrides config)
        #[arg(long)]
        retries: Option<u32>,

        /// Base backoff delay in milliseconds (overrides config)
        #[arg(long)]
        base_delay_ms: Option<u64>,
    },

    /// Validate configuration and list backends
    CheckConfig,
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // Log file naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy HTTP crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    // Console goes to stderr so JSON on stdout stays machine-readable
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Status { .. } => "status",
        Commands::Fetch { .. } => "fetch",
        Commands::CheckConfig => "check-config",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Status { backend } => commands::status::run(cli.config, backend),
        Commands::Fetch {
            backend,
            path,
            retries,
            base_delay_ms,
        } => commands::fetch::run(cli.config, backend, path, retries, base_delay_ms),
        Commands::CheckConfig => commands::check_config::run(cli.config),
    }
}
