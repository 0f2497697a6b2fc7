//! Weighted round-robin selection.

use crate::backend::{Backend, BackendRegistry};
use std::sync::{Arc, Mutex, PoisonError};

/// Cursor state: the slot being drained and how many picks it has
/// emitted. The two fields move together, hence the single mutex.
struct Cursor {
    index: usize,
    emitted: u32,
}

/// Weighted round-robin policy: emit `weight(b)` consecutive picks of
/// backend `b` before advancing to the next slot.
///
/// This is the burst form of weighted rotation, not a smooth
/// interleaving: weights `[2, 1]` yield `b0, b0, b1, b0, b0, b1, ...`.
pub struct WeightedRoundRobin {
    registry: Arc<BackendRegistry>,
    cursor: Mutex<Cursor>,
}

impl WeightedRoundRobin {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            cursor: Mutex::new(Cursor {
                index: 0,
                emitted: 0,
            }),
        }
    }

    /// Scan up to `2 * N` slots. A slot yields a pick while its backend
    /// is alive and has picks left in its burst; otherwise the cursor
    /// advances and the emission counter resets. The double sweep lets
    /// a full rotation pass over slots that were mid-drain at entry.
    pub fn select(&self) -> Option<Arc<Backend>> {
        let backends = self.registry.backends();
        if backends.is_empty() {
            return None;
        }

        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);

        for _ in 0..backends.len() * 2 {
            let backend = &backends[cursor.index % backends.len()];

            if backend.is_alive() && cursor.emitted < backend.weight() {
                cursor.emitted += 1;
                return Some(Arc::clone(backend));
            }

            cursor.index = cursor.index.wrapping_add(1);
            cursor.emitted = 0;
        }

        None
    }
}
