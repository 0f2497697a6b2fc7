//! Backend pool: the per-backend record and the immutable registry.

pub mod selector;

use crate::config::{BackendConfig, Config};
use crate::health::{FsmError, HealthEvent, HealthMachine, HealthState};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A downstream application server.
///
/// Created once at startup and never destroyed while the process runs.
/// The identity fields are immutable; health state and counters use
/// interior mutability so the registry itself never needs a lock.
pub struct Backend {
    name: String,
    host: String,
    port: u16,
    weight: u32,
    health_check_path: String,
    health_check_interval: Duration,
    health: HealthMachine,
    active_connections: AtomicU32,
    last_recovery_attempt: Mutex<Option<Instant>>,
}

impl Backend {
    /// Build a backend from its validated configuration entry.
    ///
    /// Weight normalization has already happened during validation, but
    /// a floor of 1 is kept here so a hand-built config cannot smuggle
    /// in a zero weight.
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            name: config.name.clone(),
            host: config.host.clone(),
            port: config.port,
            weight: config.weight.max(1),
            health_check_path: config.health_check.clone(),
            health_check_interval: config.health_check_interval,
            health: HealthMachine::new(&config.name),
            active_connections: AtomicU32::new(0),
            last_recovery_attempt: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn health_check_path(&self) -> &str {
        &self.health_check_path
    }

    pub fn health_check_interval(&self) -> Duration {
        self.health_check_interval
    }

    /// The network address in `host:port` form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The backend's health machine.
    pub fn health(&self) -> &HealthMachine {
        &self.health
    }

    /// Current health state (lock-free read).
    pub fn health_state(&self) -> HealthState {
        self.health.state()
    }

    /// Whether this backend may receive traffic. Only ALIVE qualifies.
    pub fn is_alive(&self) -> bool {
        self.health.state() == HealthState::Alive
    }

    /// Consecutive failed health checks since last alive.
    pub fn failure_count(&self) -> u32 {
        self.health.failure_count()
    }

    /// Ask a DOWN backend to attempt recovery.
    ///
    /// Stamps the attempt time and moves the machine to HALF_OPEN; the
    /// next probe outcome settles it. Nothing calls this periodically;
    /// it is the hook for an operator-driven or future watchdog trigger.
    pub fn force_recovery(&self) -> Result<HealthState, FsmError> {
        *self.lock_recovery() = Some(Instant::now());
        self.health.send(HealthEvent::Recovery)
    }

    /// When recovery was last attempted, if ever.
    pub fn last_recovery_attempt(&self) -> Option<Instant> {
        *self.lock_recovery()
    }

    /// Record one more in-flight connection.
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished connection.
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Number of connections currently relayed to this backend.
    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    fn lock_recovery(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.last_recovery_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// The ordered, immutable set of backends.
///
/// Insertion order is configuration order and establishes round-robin
/// order. Membership never changes after startup.
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
}

impl BackendRegistry {
    /// Build the registry from a validated configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            backends: config
                .backends
                .iter()
                .map(|b| Arc::new(Backend::from_config(b)))
                .collect(),
        }
    }

    /// All backends, in configuration order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn test_config_entry() -> BackendConfig {
        BackendConfig {
            name: "api-1".to_string(),
            host: "10.0.0.5".to_string(),
            port: 8080,
            weight: 3,
            health_check: "/healthz".to_string(),
            health_check_interval: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_backend_from_config() {
        let backend = Backend::from_config(&test_config_entry());

        assert_eq!(backend.name(), "api-1");
        assert_eq!(backend.address(), "10.0.0.5:8080");
        assert_eq!(backend.weight(), 3);
        assert_eq!(backend.health_state(), HealthState::Pending);
        assert!(!backend.is_alive());
        assert_eq!(backend.active_connections(), 0);
        assert!(backend.last_recovery_attempt().is_none());
    }

    #[test]
    fn test_connection_counting() {
        let backend = Backend::from_config(&test_config_entry());

        backend.connection_opened();
        backend.connection_opened();
        assert_eq!(backend.active_connections(), 2);

        backend.connection_closed();
        assert_eq!(backend.active_connections(), 1);
    }

    #[test]
    fn test_force_recovery_from_down() {
        let backend = Backend::from_config(&test_config_entry());
        backend.health().send(HealthEvent::Failure).unwrap();

        let state = backend.force_recovery().unwrap();
        assert_eq!(state, HealthState::HalfOpen);
        assert!(backend.last_recovery_attempt().is_some());
        assert!(!backend.is_alive());
    }

    #[test]
    fn test_force_recovery_rejected_when_alive() {
        let backend = Backend::from_config(&test_config_entry());
        backend.health().send(HealthEvent::Success).unwrap();

        assert!(backend.force_recovery().is_err());
        assert_eq!(backend.health_state(), HealthState::Alive);
    }

    #[test]
    fn test_registry_preserves_order() {
        let registry = testing::registry(&[1, 2, 3]);

        let names: Vec<&str> = registry.backends().iter().map(|b| b.name()).collect();
        assert_eq!(names, ["b0", "b1", "b2"]);
        assert_eq!(registry.len(), 3);
    }
}
