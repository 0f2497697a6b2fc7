//! Bidirectional stream engine.
//!
//! Relays bytes between an inbound and an outbound connection until
//! both directions have finished. Deadlines apply per read and per
//! write, not per session: an idle direction must be reaped while a
//! long-lived busy stream keeps flowing.

use crate::proxy::{Direction, StreamObserver};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Read size per iteration.
pub const RELAY_BUFFER_SIZE: usize = 1024;

/// Default per-operation deadline for both reads and writes.
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-direction deadlines for the relay.
#[derive(Clone, Copy, Debug)]
pub struct RelayConfig {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_IO_TIMEOUT,
            write_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

/// Bytes moved in each direction by a finished relay.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayOutcome {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
}

/// Relay bytes between `client` and `backend` until both directions
/// terminate.
///
/// Every chunk forwarded in either direction is also teed into
/// `observer`; observer failures are swallowed. One direction ending
/// does not force-close the other: each runs until its own peer
/// closes, times out, or errors. Both connections are released when
/// the last direction finishes.
pub async fn relay<C, B>(
    client: C,
    backend: B,
    observer: Arc<dyn StreamObserver>,
    config: RelayConfig,
) -> RelayOutcome
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (backend_read, backend_write) = tokio::io::split(backend);

    let c2b = tokio::spawn(copy_direction(
        client_read,
        backend_write,
        Arc::clone(&observer),
        config,
        Direction::ClientToBackend,
    ));
    let b2c = tokio::spawn(copy_direction(
        backend_read,
        client_write,
        observer,
        config,
        Direction::BackendToClient,
    ));

    let (client_to_backend, backend_to_client) = tokio::join!(c2b, b2c);

    RelayOutcome {
        client_to_backend: direction_total(client_to_backend, Direction::ClientToBackend),
        backend_to_client: direction_total(backend_to_client, Direction::BackendToClient),
    }
}

/// Unwrap a direction task's result. A crashed task must show up in the
/// log, not masquerade as an idle direction.
fn direction_total(result: Result<u64, tokio::task::JoinError>, direction: Direction) -> u64 {
    result.unwrap_or_else(|e| {
        error!(direction = %direction, error = %e, "relay direction task failed");
        0
    })
}

/// Pump one direction until EOF, deadline, or error. Returns the bytes
/// forwarded.
async fn copy_direction<R, W>(
    mut src: R,
    mut dst: W,
    observer: Arc<dyn StreamObserver>,
    config: RelayConfig,
    direction: Direction,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match timeout(config.read_timeout, src.read(&mut buf)).await {
            Err(_) => {
                warn!(
                    direction = %direction,
                    deadline = ?config.read_timeout,
                    "read deadline exceeded, closing direction"
                );
                break;
            }
            Ok(Ok(0)) => {
                debug!(direction = %direction, "peer closed");
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                error!(direction = %direction, error = %e, "read failed");
                break;
            }
        };

        match timeout(config.write_timeout, dst.write_all(&buf[..n])).await {
            Err(_) => {
                warn!(
                    direction = %direction,
                    deadline = ?config.write_timeout,
                    "write deadline exceeded, closing direction"
                );
                break;
            }
            Ok(Err(e)) => {
                error!(direction = %direction, error = %e, "write failed");
                break;
            }
            Ok(Ok(())) => {}
        }

        // The tee must not take the data path down with it.
        if let Err(e) = observer.observe(direction, &buf[..n]) {
            debug!(direction = %direction, error = %e, "observer write dropped");
        }

        total += n as u64;
    }

    total
}
