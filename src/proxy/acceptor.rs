//! Acceptor loop.
//!
//! Accepts inbound connections and hands each one to its own task:
//! pick a backend, dial it, relay. Transient accept failures are
//! retried; anything else takes the proxy down. On shutdown the loop
//! stops accepting and lets in-flight connections drain.

use crate::backend::selector::Selector;
use crate::net::{dial_backend, DEFAULT_CONNECT_TIMEOUT};
use crate::proxy::{relay, RelayConfig, StreamObserver};
use crate::util::ConnId;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Persistent accept failure; terminates the proxy.
#[derive(Debug, Error)]
pub enum AcceptError {
    #[error("failed to accept connection: {0}")]
    Fatal(#[source] io::Error),
}

/// Accepts inbound TCP connections and drives the per-connection
/// pipeline.
pub struct Acceptor {
    listener: TcpListener,
    selector: Arc<Selector>,
    observer: Arc<dyn StreamObserver>,
    relay_config: RelayConfig,
    connect_timeout: Duration,
}

impl Acceptor {
    /// Bind the listener.
    pub async fn bind(
        addr: SocketAddr,
        selector: Arc<Selector>,
        observer: Arc<dyn StreamObserver>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        info!(listen = %addr, "listener bound");

        Ok(Self {
            listener,
            selector,
            observer,
            relay_config: RelayConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Override the relay deadlines (tests use shortened ones).
    pub fn with_relay_config(mut self, relay_config: RelayConfig) -> Self {
        self.relay_config = relay_config;
        self
    }

    /// Address the listener actually bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until shutdown fires or accepting fails for good, then
    /// drain in-flight connections.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), AcceptError> {
        let mut connections = JoinSet::new();

        let result = loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            self.spawn_connection(&mut connections, stream, peer);
                        }
                        Err(e) if is_transient(&e) => {
                            debug!(error = %e, "transient accept error, retrying");
                        }
                        Err(e) => {
                            error!(error = %e, "persistent accept error, stopping listener");
                            break Err(AcceptError::Fatal(e));
                        }
                    }
                }

                // Reap finished connection tasks as we go.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                _ = shutdown.recv() => {
                    info!("listener shutting down");
                    break Ok(());
                }
            }
        };

        if !connections.is_empty() {
            info!(active = connections.len(), "draining active connections");
        }
        while connections.join_next().await.is_some() {}

        result
    }

    fn spawn_connection(&self, connections: &mut JoinSet<()>, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let selector = Arc::clone(&self.selector);
        let observer = Arc::clone(&self.observer);
        let relay_config = self.relay_config;
        let connect_timeout = self.connect_timeout;

        connections.spawn(async move {
            let conn = ConnId::new();

            let local = match stream.local_addr() {
                Ok(addr) => addr.to_string(),
                Err(_) => "unknown".to_string(),
            };
            info!(conn = %conn, client = %peer, destination = %local, "accepted connection");

            let Some(backend) = selector.select() else {
                warn!(conn = %conn, client = %peer, "no healthy backend available, dropping connection");
                return;
            };

            debug!(conn = %conn, backend = backend.name(), "selected backend");

            let outbound = match dial_backend(&backend.address(), connect_timeout).await {
                Ok(outbound) => outbound,
                Err(e) => {
                    error!(
                        conn = %conn,
                        backend = backend.name(),
                        error = %e,
                        "failed to connect to backend"
                    );
                    return;
                }
            };

            backend.connection_opened();
            let outcome = relay(stream, outbound, observer, relay_config).await;
            backend.connection_closed();

            info!(
                conn = %conn,
                backend = backend.name(),
                to_backend = outcome.client_to_backend,
                to_client = outcome.backend_to_client,
                "connection finished"
            );
        });
    }
}

/// Accept errors the OS flags as momentary: retrying is the right move.
fn is_transient(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    ) {
        return true;
    }

    // Descriptor exhaustion has no ErrorKind of its own; it clears once
    // in-flight connections finish, so back off rather than die.
    matches!(e.raw_os_error(), Some(libc::EMFILE | libc::ENFILE))
}
