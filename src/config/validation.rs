//! Configuration validation.

use crate::config::Config;
use std::collections::HashSet;

/// Validate the configuration and normalize backend weights.
///
/// Checks for:
/// - A non-empty instance name
/// - A valid listener port
/// - A non-empty backend list
/// - Per-backend name, host, port, and health-check path
/// - Unique backend names
///
/// A backend weight of 0 is rewritten to 1 here, so the registry never
/// observes weight 0.
///
/// # Returns
///
/// `Ok(())` if valid, or a message naming the offending field (and for
/// backend errors, the backend's index and name).
pub fn validate_config(config: &mut Config) -> Result<(), String> {
    if config.name.is_empty() {
        return Err("name is required for the configuration".to_string());
    }

    if config.port == 0 {
        return Err("a valid listener port (1-65535) is required".to_string());
    }

    if config.backends.is_empty() {
        return Err("at least one backend is required".to_string());
    }

    let mut seen_names = HashSet::new();

    for (index, backend) in config.backends.iter_mut().enumerate() {
        let label = backend_label(&backend.name).to_string();
        let describe = move |field: &str| format!("backend {index} ({label}): {field}");

        if backend.name.is_empty() {
            return Err(describe("name is required"));
        }

        if !seen_names.insert(backend.name.clone()) {
            return Err(describe("duplicate backend name"));
        }

        if backend.host.is_empty() {
            return Err(describe("host is required"));
        }

        if backend.port == 0 {
            return Err(describe("a valid port (1-65535) is required"));
        }

        if backend.health_check.is_empty() {
            return Err(describe("health_check path is required"));
        }

        if backend.health_check_interval.is_zero() {
            return Err(describe("health_check_interval must be positive"));
        }

        if backend.weight == 0 {
            backend.weight = 1;
        }
    }

    Ok(())
}

fn backend_label(name: &str) -> &str {
    if name.is_empty() {
        "<unnamed>"
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Algorithm, BackendConfig, Env, Scheme};
    use std::time::Duration;

    fn minimal_config() -> Config {
        Config {
            name: "splitbit-test".to_string(),
            env: Env::Dev,
            algorithm: Algorithm::RoundRobin,
            scheme: Scheme::Tcp,
            port: 9100,
            backends: vec![BackendConfig {
                name: "b1".to_string(),
                host: "127.0.0.1".to_string(),
                port: 9001,
                weight: 1,
                health_check: "/health".to_string(),
                health_check_interval: Duration::from_secs(5),
            }],
        }
    }

    #[test]
    fn test_valid_config() {
        let mut config = minimal_config();
        assert!(validate_config(&mut config).is_ok());
    }

    #[test]
    fn test_missing_name() {
        let mut config = minimal_config();
        config.name.clear();
        let result = validate_config(&mut config);
        assert!(result.unwrap_err().contains("name is required"));
    }

    #[test]
    fn test_zero_listener_port() {
        let mut config = minimal_config();
        config.port = 0;
        let result = validate_config(&mut config);
        assert!(result.unwrap_err().contains("listener port"));
    }

    #[test]
    fn test_no_backends() {
        let mut config = minimal_config();
        config.backends.clear();
        let result = validate_config(&mut config);
        assert!(result.unwrap_err().contains("at least one backend"));
    }

    #[test]
    fn test_backend_error_names_index_and_backend() {
        let mut config = minimal_config();
        config.backends.push(BackendConfig {
            name: "b2".to_string(),
            host: String::new(),
            port: 9002,
            weight: 1,
            health_check: "/health".to_string(),
            health_check_interval: Duration::from_secs(5),
        });
        let err = validate_config(&mut config).unwrap_err();
        assert!(err.contains("backend 1 (b2)"), "unexpected message: {err}");
        assert!(err.contains("host is required"));
    }

    #[test]
    fn test_duplicate_backend_names() {
        let mut config = minimal_config();
        let duplicate = config.backends[0].clone();
        config.backends.push(duplicate);
        let err = validate_config(&mut config).unwrap_err();
        assert!(err.contains("duplicate backend name"));
    }

    #[test]
    fn test_backend_zero_port() {
        let mut config = minimal_config();
        config.backends[0].port = 0;
        let err = validate_config(&mut config).unwrap_err();
        assert!(err.contains("backend 0 (b1)"));
        assert!(err.contains("valid port"));
    }

    #[test]
    fn test_missing_health_check() {
        let mut config = minimal_config();
        config.backends[0].health_check.clear();
        let err = validate_config(&mut config).unwrap_err();
        assert!(err.contains("health_check path is required"));
    }

    #[test]
    fn test_weight_zero_normalized_to_one() {
        let mut config = minimal_config();
        config.backends[0].weight = 0;
        validate_config(&mut config).unwrap();
        assert_eq!(config.backends[0].weight, 1);
    }

    #[test]
    fn test_positive_weight_untouched() {
        let mut config = minimal_config();
        config.backends[0].weight = 7;
        validate_config(&mut config).unwrap();
        assert_eq!(config.backends[0].weight, 7);
    }
}
