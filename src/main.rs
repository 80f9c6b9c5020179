//! block-exchange: content-addressed block server
//!
//! Features:
//! - HTTP/1.0 and HTTP/1.1 with keep-alive
//! - Batched token lookup over a protobuf payload
//! - Per-operation deadlines on every connection
//! - Configuration via CLI arguments or TOML file

use block_exchange::config::Config;
use block_exchange::runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        workers = ?config.workers,
        request_timeout_secs = config.request_timeout.as_secs(),
        max_body_size = config.max_body_size,
        max_block_size = config.max_block_size,
        "Starting block-exchange server"
    );

    runtime::run(config)?;
    Ok(())
}
