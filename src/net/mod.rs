//! Outbound connection establishment.
//!
//! Two paths: a plain dial to a named backend (the default mode), and a
//! transparent dial that reconstructs the client's original destination
//! with the Linux transparent-proxy socket options.

mod dialer;
mod transparent;

pub use dialer::{dial_backend, DialError, DEFAULT_CONNECT_TIMEOUT};
pub use transparent::dial_original_destination;
