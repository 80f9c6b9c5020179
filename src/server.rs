//! TCP listener and composition root for the block exchange.
//!
//! The listener accepts connections and hands each one to a new [`Session`]
//! running as its own task. The server ties the listener to the shared
//! content directory.

use crate::config::Config;
use crate::directory::Directory;
use crate::error::{report, ServerError};
use crate::protocols::exchange::BlockExchange;
use crate::runtime::connection::{Session, SessionConfig};
use crate::runtime::dispatch::Dispatcher;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, debug_span, error, info, warn, Instrument};

/// Accepting endpoint bound to one dispatcher.
pub struct Listener {
    listener: TcpListener,
    dispatcher: Arc<dyn Dispatcher>,
    session: SessionConfig,
    shutdown_timeout: Duration,
}

impl Listener {
    /// Open, bind and listen on `addr` with address reuse and the platform's
    /// maximum backlog. Must be called from within a tokio runtime.
    pub fn bind(
        addr: SocketAddr,
        dispatcher: Arc<dyn Dispatcher>,
        session: SessionConfig,
        shutdown_timeout: Duration,
    ) -> Result<Self, ServerError> {
        let listener = create_listener(addr)
            .and_then(TcpListener::from_std)
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            dispatcher,
            session,
            shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves, then give in-flight
    /// sessions the grace period before dropping them.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(active = sessions.len(), "Shutdown requested, no longer accepting");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "New connection");
                        if let Err(e) = stream.set_nodelay(true) {
                            report("accept", &e);
                        }
                        let session = Session::new(stream, Arc::clone(&self.dispatcher), self.session);
                        sessions.spawn(session.run().instrument(debug_span!("session", peer = %peer)));
                    }
                    Err(e) => report("accept", &e),
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Session task failed");
                    }
                }
            }
        }

        let drain = async {
            while sessions.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.shutdown_timeout, drain).await.is_err() {
            warn!(remaining = sessions.len(), "Grace period elapsed, dropping sessions");
            sessions.abort_all();
        }
    }
}

/// Create a listening socket with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(libc::SOMAXCONN)?;

    Ok(socket.into())
}

/// Block exchange server instance
pub struct Server {
    config: Config,
    exchange: BlockExchange,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let directory = Directory::new(config.max_block_size);
        Server {
            exchange: BlockExchange::new(directory),
            config,
        }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        self.exchange.directory()
    }

    /// Bind the configured address.
    pub fn bind(&self) -> Result<Listener, ServerError> {
        Listener::bind(
            self.config.listen,
            Arc::new(self.exchange.clone()),
            self.config.session(),
            self.config.shutdown_timeout,
        )
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind()?;
        info!(address = %self.config.listen, "Server listening");
        listener.run(shutdown).await;
        info!("Server stopped");
        Ok(())
    }
}
