//! Graceful shutdown handling.

use tokio::sync::broadcast;
use tracing::{error, warn};

/// Manages graceful shutdown signals.
///
/// One sender fans out to every long-running task (probers, the
/// acceptor). Firing the signal is idempotent.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal manager.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        let _ = self.sender.send(());
    }

    /// Spawn a task that fires this signal when SIGINT arrives.
    pub fn trigger_on_interrupt(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("interrupt signal received, stopping");
                    signal.shutdown();
                }
                Err(e) => {
                    error!(error = %e, "failed to listen for interrupt signal");
                }
            }
        });
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
