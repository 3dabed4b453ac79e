//! gemcache: a caching reverse proxy for the Gemini protocol.
//!
//! Serves each `gemini://` request from the local cache when possible and
//! otherwise fetches it upstream, streaming the body to the client while
//! filling the cache.

use std::path::PathBuf;

use clap::Parser;

use gemcache::config::{self, parse_config, ProxyConfig};
use gemcache::lifecycle::{signals, startup, Shutdown};
use gemcache::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "gemcache")]
#[command(about = "Caching reverse proxy for the Gemini protocol", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,

    /// Override `cache.dir`.
    #[arg(long)]
    cache_dir: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check_config: bool,
}

fn resolve_config(cli: &Cli) -> Result<ProxyConfig, config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => parse_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache.dir = dir.clone();
    }
    config::validate_config(&config).map_err(config::ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    if cli.check_config {
        println!("configuration OK");
        return Ok(());
    }

    logging::init_logging(&config.observability)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        cache_dir = %config.cache.dir,
        max_connections = config.listener.max_connections,
        "gemcache v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    tokio::spawn(signals::trigger_on_signal(shutdown.clone()));

    startup::run(config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
