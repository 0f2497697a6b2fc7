//! Configuration file loading.

use crate::config::{validate_config, Config};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Load configuration from a YAML file.
///
/// Reads the file, parses the YAML, validates the result, and applies
/// weight normalization. Any failure is fatal at startup.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;

    let mut config: Config = serde_yaml::from_str(&contents)?;

    validate_config(&mut config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_minimal_config() {
        let yaml = r#"
name: splitbit
algorithm: round-robin
scheme: tcp
port: 9100
backends:
  - name: b1
    host: 127.0.0.1
    port: 9001
    health_check: /health
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.name, "splitbit");
        assert_eq!(config.port, 9100);
        assert_eq!(config.backends.len(), 1);
        // weight omitted -> 0 -> normalized
        assert_eq!(config.backends[0].weight, 1);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.yml");
        assert!(matches!(result.unwrap_err(), ConfigError::Read(_)));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not: valid: yaml: {{{}}}").unwrap();

        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_invalid_config() {
        let yaml = r#"
name: splitbit
algorithm: round-robin
scheme: tcp
port: 9100
backends: []
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }
}
