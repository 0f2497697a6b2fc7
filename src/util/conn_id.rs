//! Connection ID generation for log correlation.
//!
//! Every accepted connection gets a short identifier so the accept,
//! dial, and both stream directions can be tied together in the logs.

use uuid::Uuid;

/// Short identifier attached to every per-connection log line.
#[derive(Clone, Debug)]
pub struct ConnId(String);

impl ConnId {
    /// Generate a fresh connection id.
    ///
    /// Uses the first segment of a v4 UUID; unique enough for log
    /// correlation without the full 36-character form.
    pub fn new() -> Self {
        let uuid = Uuid::new_v4().to_string();
        let short = uuid.split('-').next().unwrap_or(&uuid).to_string();
        Self(short)
    }

    /// Get the connection id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
