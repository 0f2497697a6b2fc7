//! The data path: accept, select, dial, relay.

mod acceptor;
mod monitor;
mod stream;

pub use acceptor::{Acceptor, AcceptError};
pub use monitor::{Direction, StreamObserver, TrafficMonitor};
pub use stream::{relay, RelayConfig, RelayOutcome, RELAY_BUFFER_SIZE};
