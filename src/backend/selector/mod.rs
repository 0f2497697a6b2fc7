//! Backend selection policies.
//!
//! Both policies are known at build time, so the selector is a closed
//! sum rather than a trait object. Each variant serializes its cursor
//! state behind one mutex; the compound cursor/counter update in the
//! weighted policy is why a plain atomic is not enough.

mod round_robin;
mod weighted;

pub use round_robin::RoundRobin;
pub use weighted::WeightedRoundRobin;

use crate::backend::{Backend, BackendRegistry};
use crate::config::Algorithm;
use std::sync::Arc;

/// Picks one backend per inbound connection.
pub enum Selector {
    RoundRobin(RoundRobin),
    WeightedRoundRobin(WeightedRoundRobin),
}

impl Selector {
    /// Build the selector named by the configuration.
    pub fn from_config(algorithm: Algorithm, registry: Arc<BackendRegistry>) -> Self {
        match algorithm {
            Algorithm::RoundRobin => Selector::RoundRobin(RoundRobin::new(registry)),
            Algorithm::WeightedRoundRobin => {
                Selector::WeightedRoundRobin(WeightedRoundRobin::new(registry))
            }
        }
    }

    /// Select the next backend, or `None` when no backend is alive.
    pub fn select(&self) -> Option<Arc<Backend>> {
        match self {
            Selector::RoundRobin(rr) => rr.select(),
            Selector::WeightedRoundRobin(wrr) => wrr.select(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing;

    #[test]
    fn test_from_config_picks_the_right_policy() {
        let registry = testing::alive_registry(&[1, 1]);

        let rr = Selector::from_config(Algorithm::RoundRobin, Arc::clone(&registry));
        assert!(matches!(rr, Selector::RoundRobin(_)));

        let wrr = Selector::from_config(Algorithm::WeightedRoundRobin, registry);
        assert!(matches!(wrr, Selector::WeightedRoundRobin(_)));
    }

    #[test]
    fn test_selector_dispatch() {
        let registry = testing::alive_registry(&[1, 1]);
        let selector = Selector::from_config(Algorithm::RoundRobin, registry);

        assert_eq!(selector.select().unwrap().name(), "b0");
        assert_eq!(selector.select().unwrap().name(), "b1");
    }
}
