//! Async runtime plumbing for the server.
//!
//! A multi-threaded tokio runtime services every connection. Each session
//! runs as one task, so its own steps never race while independent sessions
//! proceed in parallel on the worker pool.
//!
//! - `TimeoutStream`: byte stream with a renewable deadline
//! - `Session`: per-connection state machine
//! - `Dispatcher` / `Responder`: hand-off between sessions and handlers

pub mod connection;
pub mod dispatch;
pub mod stream;

pub use connection::{ConnState, Session, SessionConfig};
pub use dispatch::{Dispatcher, Outgoing, Responder};
pub use stream::TimeoutStream;

use crate::config::Config;
use crate::error::ServerError;
use crate::server::Server;
use tracing::{info, warn};

/// Build the worker pool and serve until Ctrl-C.
pub fn run(config: Config) -> Result<(), ServerError> {
    let num_workers = config.workers.filter(|&n| n > 0).unwrap_or_else(num_cpus);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_workers)
        .thread_name("block-exchange-worker")
        .enable_all()
        .build()
        .map_err(ServerError::Runtime)?;

    info!(workers = num_workers, addr = %config.listen, "Starting runtime");

    runtime.block_on(Server::new(config).run(shutdown_signal()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
