//! Observer tap for relayed traffic.
//!
//! The stream engine tees every chunk it forwards into an observer
//! sink. The sink is a capability handed in at construction; it must
//! never be able to take the data path down, so the engine drops its
//! errors on the floor.

use crate::util::http;
use std::io;
use tracing::debug;

/// Which way a chunk is flowing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ClientToBackend => f.write_str("client->backend"),
            Direction::BackendToClient => f.write_str("backend->client"),
        }
    }
}

/// Sink receiving a copy of every relayed chunk.
///
/// Implementations may fail; the engine ignores the result.
pub trait StreamObserver: Send + Sync {
    fn observe(&self, direction: Direction, chunk: &[u8]) -> io::Result<()>;
}

/// Default observer: describes relayed chunks in the debug log, tagging
/// chunks that open with an HTTP request line. The proxy never acts on
/// that detection; it exists to make captures readable.
pub struct TrafficMonitor;

impl StreamObserver for TrafficMonitor {
    fn observe(&self, direction: Direction, chunk: &[u8]) -> io::Result<()> {
        match http::request_method(chunk) {
            Some(method) => debug!(
                target: "monitor",
                direction = %direction,
                bytes = chunk.len(),
                method,
                "relayed http request chunk"
            ),
            None => debug!(
                target: "monitor",
                direction = %direction,
                bytes = chunk.len(),
                "relayed chunk"
            ),
        }

        Ok(())
    }
}
