//! # Async Relay
//!
//! Runs one relay instance.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment (`PORT` is required)
//! 2. Initialize logging (`RUST_LOG`, `RELAY_LOG_JSON`)
//! 3. Bind `HOST:PORT` and serve until Ctrl+C

use anyhow::{Context, Result};
use async_relay::{RelayConfig, RelayService};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = RelayConfig::from_env().context("failed to load relay configuration")?;
    init_logging(config.logging.json)?;

    info!(
        version = async_relay::VERSION,
        addr = %config.authority(),
        "Async relay starting"
    );

    let service = RelayService::new(config)?;
    service
        .start(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down...");
            }
        })
        .await?;

    Ok(())
}
