//! Configuration loading, parsing, and validation.

mod loader;
mod types;
mod validation;

pub use loader::{load_config, ConfigError};
pub use types::{Algorithm, BackendConfig, Config, Env, Scheme};
pub use validation::validate_config;
