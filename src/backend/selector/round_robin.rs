//! Round-robin selection.

use crate::backend::{Backend, BackendRegistry};
use std::sync::{Arc, Mutex, PoisonError};

/// Round-robin policy: walk the registry in order, skipping backends
/// that are not alive.
pub struct RoundRobin {
    registry: Arc<BackendRegistry>,
    cursor: Mutex<usize>,
}

impl RoundRobin {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            cursor: Mutex::new(0),
        }
    }

    /// Scan up to one full sweep from the cursor, advancing it past
    /// every inspected position. The cursor is never reset, so a
    /// backend going down does not disturb the rotation of the rest.
    pub fn select(&self) -> Option<Arc<Backend>> {
        let backends = self.registry.backends();
        if backends.is_empty() {
            return None;
        }

        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);

        for _ in 0..backends.len() {
            let backend = &backends[*cursor % backends.len()];
            *cursor = cursor.wrapping_add(1);

            if backend.is_alive() {
                return Some(Arc::clone(backend));
            }
        }

        None
    }
}
