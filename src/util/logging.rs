//! Logging initialization and configuration.

use crate::config::Env;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system.
///
/// The threshold follows the configured environment: `DEV` logs from
/// DEBUG up, `PROD` from INFO up. An explicit `level` (e.g. from the
/// command line) overrides the environment-derived threshold, and
/// `RUST_LOG` overrides both.
///
/// `DEV` uses the human-readable format; `PROD` emits JSON lines. Both
/// carry an RFC 3339 timestamp and the severity tag.
pub fn init_logging(env: &Env, level: Option<&str>) {
    let default_level = match env {
        Env::Dev => "debug",
        Env::Prod => "info",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or(default_level)));

    let registry = tracing_subscriber::registry().with(filter);

    match env {
        Env::Prod => {
            registry.with(fmt::layer().json()).init();
        }
        Env::Dev => {
            registry.with(fmt::layer()).init();
        }
    }
}
