//! bili-archiver HTTP server
//!
//! Reads configuration from the environment (and `.env`), then serves the
//! REST API until SIGTERM or Ctrl+C.

use bili_archiver::api::start_api_server;
use bili_archiver::{Archiver, Config, shutdown_signal};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let archiver = Arc::new(Archiver::new(config.clone()).await?);

    tracing::info!(
        bind_address = %config.api.bind_address,
        output_base_dir = %config.download.output_base_dir.display(),
        "starting bili-archiver"
    );

    start_api_server(archiver, Arc::new(config), shutdown_signal()).await?;
    Ok(())
}
