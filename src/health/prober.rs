//! Active health prober.
//!
//! One long-running task per backend issues an HTTP GET against the
//! backend's health endpoint on every tick and feeds the outcome into
//! the backend's state machine.

use crate::backend::Backend;
use crate::health::{FsmError, HealthEvent, HealthState};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Overall deadline for a single health-check request.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors a single health check can produce.
///
/// These never leave the prober: every variant is folded into a
/// `Failure` event for the backend's state machine.
#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("request failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("health check timed out")]
    Timeout,

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed response")]
    Malformed,
}

/// Periodically probes one backend and drives its health machine.
pub struct HealthProber {
    backend: Arc<Backend>,
}

impl HealthProber {
    /// Create a prober for the given backend.
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    /// Run the probe loop until shutdown fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let backend = self.backend;

        debug!(
            backend = backend.name(),
            interval = ?backend.health_check_interval(),
            "health prober starting"
        );

        let mut ticker = interval(backend.health_check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !probe_once(&backend).await {
                        break;
                    }
                }

                _ = shutdown.recv() => {
                    debug!(backend = backend.name(), "health prober shutting down");
                    break;
                }
            }
        }
    }
}

/// Run one probe and apply its outcome. Returns `false` if the prober
/// should stop (the machine's configuration is broken for this backend).
async fn probe_once(backend: &Backend) -> bool {
    let result = match timeout(HEALTH_CHECK_TIMEOUT, check(backend)).await {
        Ok(result) => result,
        Err(_) => Err(HealthCheckError::Timeout),
    };

    let state = backend.health_state();

    // Drop redundant outcomes so steady state neither spams the log nor
    // inflates the failure counter.
    match &result {
        Ok(()) if state == HealthState::Alive => {
            debug!(backend = backend.name(), "health check passed");
            return true;
        }
        Err(e) if state == HealthState::Down => {
            debug!(backend = backend.name(), error = %e, "health check still failing");
            return true;
        }
        _ => {}
    }

    let event = match &result {
        Ok(()) => HealthEvent::Success,
        Err(e) => {
            warn!(backend = backend.name(), error = %e, "health check failed");
            HealthEvent::Failure
        }
    };

    match backend.health().send(event) {
        Ok(new_state) => {
            info!(
                backend = backend.name(),
                state = %new_state,
                "backend health changed"
            );
            true
        }
        Err(e @ FsmError::EventRejected { .. }) => {
            warn!(backend = backend.name(), error = %e, "health event rejected");
            true
        }
        Err(e @ FsmError::InvalidConfig(_)) => {
            error!(
                backend = backend.name(),
                error = %e,
                "health machine misconfigured, prober stopping"
            );
            false
        }
    }
}

/// Issue `GET http://{host}:{port}{path}` and classify the response.
async fn check(backend: &Backend) -> Result<(), HealthCheckError> {
    let mut stream = TcpStream::connect((backend.host(), backend.port()))
        .await
        .map_err(HealthCheckError::Connect)?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        backend.health_check_path(),
        backend.address(),
    );

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(HealthCheckError::Io)?;

    // The status line is all we need; one read is enough for any sane
    // health endpoint.
    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await.map_err(HealthCheckError::Io)?;
    if n == 0 {
        return Err(HealthCheckError::Malformed);
    }

    let status = parse_status(&String::from_utf8_lossy(&buf[..n]))?;

    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(HealthCheckError::Status(status))
    }
}

/// Parse the status code out of `HTTP/1.1 200 OK\r\n...`.
fn parse_status(response: &str) -> Result<u16, HealthCheckError> {
    let mut parts = response.split_whitespace();

    if !parts
        .next()
        .is_some_and(|version| version.starts_with("HTTP/"))
    {
        return Err(HealthCheckError::Malformed);
    }

    parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or(HealthCheckError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use tokio::net::TcpListener;

    fn test_backend(host: &str, port: u16) -> Arc<Backend> {
        Arc::new(Backend::from_config(&BackendConfig {
            name: "probe-test".to_string(),
            host: host.to_string(),
            port,
            weight: 1,
            health_check: "/health".to_string(),
            health_check_interval: Duration::from_millis(50),
        }))
    }

    /// Serve `count` responses with the given status, then stop.
    async fn serve_health(listener: TcpListener, status: u16, count: usize) {
        for _ in 0..count {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let response = format!("HTTP/1.1 {status} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            let _ = stream.write_all(response.as_bytes()).await;
        }
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("HTTP/1.1 200 OK\r\n").unwrap(), 200);
        assert_eq!(parse_status("HTTP/1.0 404 Not Found\r\n").unwrap(), 404);
        assert_eq!(parse_status("HTTP/1.1 503 Service Unavailable").unwrap(), 503);
    }

    #[test]
    fn test_parse_status_invalid() {
        assert!(parse_status("invalid").is_err());
        assert!(parse_status("").is_err());
        assert!(parse_status("SSH-2.0-OpenSSH_9.0").is_err());
        assert!(parse_status("HTTP/1.1 abc OK").is_err());
    }

    #[tokio::test]
    async fn test_check_accepts_2xx() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_health(listener, 204, 1));

        let backend = test_backend("127.0.0.1", port);
        assert!(check(&backend).await.is_ok());
    }

    #[tokio::test]
    async fn test_check_rejects_500() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_health(listener, 500, 1));

        let backend = test_backend("127.0.0.1", port);
        let err = check(&backend).await.unwrap_err();
        assert!(matches!(err, HealthCheckError::Status(500)));
    }

    #[tokio::test]
    async fn test_check_connection_refused() {
        // Port 1 is (very likely) not listening.
        let backend = test_backend("127.0.0.1", 1);
        let err = check(&backend).await.unwrap_err();
        assert!(matches!(err, HealthCheckError::Connect(_)));
    }

    #[tokio::test]
    async fn test_probe_drives_pending_to_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_health(listener, 200, 1));

        let backend = test_backend("127.0.0.1", port);
        assert_eq!(backend.health_state(), HealthState::Pending);

        assert!(probe_once(&backend).await);
        assert_eq!(backend.health_state(), HealthState::Alive);
    }

    #[tokio::test]
    async fn test_probe_suppresses_redundant_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_health(listener, 200, 2));

        let backend = test_backend("127.0.0.1", port);
        assert!(probe_once(&backend).await);
        // The second success must not reach the machine: Alive has no
        // Success transition and a rejection would have been logged as
        // a warning, but more importantly the state must hold.
        assert!(probe_once(&backend).await);
        assert_eq!(backend.health_state(), HealthState::Alive);
        assert_eq!(backend.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_suppresses_redundant_failure() {
        let backend = test_backend("127.0.0.1", 1);

        assert!(probe_once(&backend).await);
        assert_eq!(backend.health_state(), HealthState::Down);
        assert_eq!(backend.failure_count(), 1);

        // Still refusing connections: no second Down entry.
        assert!(probe_once(&backend).await);
        assert_eq!(backend.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_probe_flap_down_then_up() {
        // First probe hits a port nothing listens on anymore.
        let backend_port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let backend = test_backend("127.0.0.1", backend_port);
        assert!(probe_once(&backend).await);
        assert_eq!(backend.health_state(), HealthState::Down);

        // Backend comes back on the same port.
        let listener = TcpListener::bind(("127.0.0.1", backend_port)).await.unwrap();
        tokio::spawn(serve_health(listener, 200, 1));

        assert!(probe_once(&backend).await);
        assert_eq!(backend.health_state(), HealthState::Alive);
        assert_eq!(backend.failure_count(), 0);
    }
}
