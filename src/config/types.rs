//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Name of this proxy instance.
    pub name: String,

    /// Deployment environment; controls the log threshold.
    #[serde(default)]
    pub env: Env,

    /// Backend selection algorithm.
    pub algorithm: Algorithm,

    /// Listener scheme.
    pub scheme: Scheme,

    /// Port the listener binds on.
    pub port: u16,

    /// Backend pool; order here is round-robin order.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Env {
    #[default]
    #[serde(alias = "")]
    Dev,
    Prod,
}

/// Backend selection algorithm.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    RoundRobin,
    WeightedRoundRobin,
}

/// Listener scheme. Only raw TCP is supported.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Tcp,
}

/// A single backend entry in the pool.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Stable name used in logs and error messages.
    pub name: String,

    /// Host the backend listens on.
    pub host: String,

    /// Port the backend listens on.
    pub port: u16,

    /// Weight for weighted round-robin; 0 is normalized to 1.
    #[serde(default)]
    pub weight: u32,

    /// Health-check URL path (e.g. `/health`).
    pub health_check: String,

    /// How often the backend is probed.
    #[serde(default = "default_health_check_interval", with = "humantime_serde")]
    pub health_check_interval: Duration,
}

pub(crate) fn default_health_check_interval() -> Duration {
    Duration::from_secs(5)
}

impl std::fmt::Display for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Env::Dev => f.write_str("DEV"),
            Env::Prod => f.write_str("PROD"),
        }
    }
}
