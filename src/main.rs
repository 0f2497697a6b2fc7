//! splitbit - a transparent Layer 4 TCP reverse proxy and load balancer
//!
//! Usage:
//!     splitbit --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use splitbit::backend::selector::Selector;
use splitbit::backend::BackendRegistry;
use splitbit::config::{load_config, Config};
use splitbit::health::HealthProber;
use splitbit::proxy::{Acceptor, TrafficMonitor};
use splitbit::util::{init_logging, ShutdownSignal};

/// A transparent Layer 4 TCP reverse proxy and load balancer.
#[derive(Parser, Debug)]
#[command(name = "splitbit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "./splitbit-config.yml")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    if cli.validate {
        println!("Configuration is valid.");
        println!("  Listener: 0.0.0.0:{} ({:?})", config.port, config.scheme);
        println!("  Algorithm: {:?}", config.algorithm);
        println!("  Backends: {}", config.backends.len());
        for backend in &config.backends {
            println!(
                "    - {} {}:{} weight={} {}",
                backend.name, backend.host, backend.port, backend.weight, backend.health_check
            );
        }
        return Ok(());
    }

    init_logging(&config.env, cli.log_level.as_deref());

    info!(
        config_path = %cli.config.display(),
        name = %config.name,
        env = %config.env,
        backends = config.backends.len(),
        "splitbit starting"
    );

    run(config)
}

/// Run the proxy with the given configuration.
fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run_async(config))
}

/// Async entry point: register backends, start probers, accept.
async fn run_async(config: Config) -> Result<()> {
    let shutdown = ShutdownSignal::new();
    let registry = Arc::new(BackendRegistry::from_config(&config));

    for backend in registry.backends() {
        info!(
            backend = backend.name(),
            address = %backend.address(),
            weight = backend.weight(),
            health_check = backend.health_check_path(),
            "registered backend"
        );

        let prober = HealthProber::new(Arc::clone(backend));
        tokio::spawn(prober.run(shutdown.subscribe()));
    }

    let selector = Arc::new(Selector::from_config(config.algorithm, registry));

    let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let acceptor = Acceptor::bind(listen_addr, selector, Arc::new(TrafficMonitor))
        .await
        .with_context(|| format!("failed to listen on {listen_addr}"))?;

    info!(port = config.port, "splitbit ready to accept connections");

    shutdown.trigger_on_interrupt();

    acceptor
        .run(shutdown.subscribe())
        .await
        .context("listener terminated")?;

    info!("splitbit shut down cleanly");
    Ok(())
}
