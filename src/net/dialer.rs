//! Plain outbound dialing.

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Connect deadline used when the caller does not configure one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound socket setup failure. Per-connection: logged by the caller
/// and the inbound connection is dropped.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("failed to create socket: {0}")]
    Socket(#[source] io::Error),

    #[error("socket option {option}: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection to {0} timed out")]
    Timeout(String),

    #[error("transparent dialing is not supported on this platform")]
    Unsupported,
}

/// Open an ordinary TCP connection to a backend address.
///
/// `addr` is the backend's `host:port`; hostnames are resolved by the
/// runtime. The connect is bounded by `connect_timeout`.
pub async fn dial_backend(addr: &str, connect_timeout: Duration) -> Result<TcpStream, DialError> {
    debug!(backend = addr, "connecting to backend");

    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                warn!(backend = addr, error = %e, "failed to set TCP_NODELAY on backend connection");
            }
            Ok(stream)
        }
        Ok(Err(e)) => Err(DialError::Connect {
            addr: addr.to_string(),
            source: e,
        }),
        Err(_) => Err(DialError::Timeout(addr.to_string())),
    }
}
