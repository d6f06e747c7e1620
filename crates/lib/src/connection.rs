//! Backend connection state and the periodic health monitor.

use crate::backend::{BackendError, ChatBackend, HealthResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Last known reachability of the proxy and the ADK server behind it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    /// No probe has completed yet.
    #[default]
    Checking,
    Connected,
    /// Proxy answered but the ADK server is not ready.
    AdkDisconnected,
    /// Proxy unreachable or answered with something unreadable.
    Disconnected,
}

impl ConnectionState {
    /// Map a health probe result to a state. Never yields `Checking`.
    pub fn from_probe(result: &Result<HealthResponse, BackendError>) -> Self {
        match result {
            Ok(health) if health.is_ready() => ConnectionState::Connected,
            Ok(_) => ConnectionState::AdkDisconnected,
            Err(_) => ConnectionState::Disconnected,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Checking => "Checking...",
            ConnectionState::Connected => "Connected",
            ConnectionState::AdkDisconnected => "ADK Server Offline",
            ConnectionState::Disconnected => "Proxy Offline",
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Warning shown on the welcome screen when not connected.
    pub fn warning(self) -> Option<&'static str> {
        match self {
            ConnectionState::Connected => None,
            ConnectionState::AdkDisconnected => {
                Some("⚠️ ADK server offline. Some features may be unavailable.")
            }
            ConnectionState::Checking | ConnectionState::Disconnected => {
                Some("⚠️ Proxy server offline. Make sure it is running on port 3001.")
            }
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Run one health probe. All failures resolve to [`ConnectionState::Disconnected`].
pub async fn probe(backend: &dyn ChatBackend) -> ConnectionState {
    let result = backend.health().await;
    if let Err(ref e) = result {
        log::debug!("health probe failed: {}", e);
    }
    ConnectionState::from_probe(&result)
}

/// Handle to the background probe task. Dropping the handle stops the task.
pub struct HealthMonitor {
    handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Probe immediately, then every `interval`, publishing each result to `state`.
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        backend: Arc<dyn ChatBackend>,
        interval: Duration,
        state: Arc<watch::Sender<ConnectionState>>,
    ) -> Self {
        log::debug!("health monitor started, interval {:?}", interval);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let next = probe(backend.as_ref()).await;
                let prev = state.send_replace(next);
                if prev != next {
                    log::info!("connection state: {} -> {}", prev, next);
                }
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Stop polling. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            log::debug!("health monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        probes: AtomicUsize,
    }

    #[async_trait]
    impl ChatBackend for CountingBackend {
        async fn health(&self) -> Result<HealthResponse, BackendError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(HealthResponse {
                status: "ok".to_string(),
                adk_server: "connected".to_string(),
            })
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<String, BackendError> {
            Err(BackendError::Decode("unused".to_string()))
        }
    }

    fn health(status: &str, adk: &str) -> Result<HealthResponse, BackendError> {
        Ok(HealthResponse {
            status: status.to_string(),
            adk_server: adk.to_string(),
        })
    }

    #[test]
    fn probe_result_mapping() {
        assert_eq!(
            ConnectionState::from_probe(&health("ok", "connected")),
            ConnectionState::Connected
        );
        assert_eq!(
            ConnectionState::from_probe(&health("ok", "down")),
            ConnectionState::AdkDisconnected
        );
        assert_eq!(
            ConnectionState::from_probe(&health("degraded", "connected")),
            ConnectionState::AdkDisconnected
        );
        assert_eq!(
            ConnectionState::from_probe(&Err(BackendError::Decode("eof".to_string()))),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(ConnectionState::AdkDisconnected).unwrap(),
            "adk-disconnected"
        );
        assert_eq!(ConnectionState::default(), ConnectionState::Checking);
        assert!(ConnectionState::Connected.warning().is_none());
        assert!(ConnectionState::Disconnected.warning().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_probes_at_startup_and_on_interval_until_stopped() {
        let backend = Arc::new(CountingBackend {
            probes: AtomicUsize::new(0),
        });
        let (tx, mut rx) = watch::channel(ConnectionState::Checking);
        let mut monitor =
            HealthMonitor::spawn(backend.clone(), Duration::from_secs(30), Arc::new(tx));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectionState::Connected);
        assert_eq!(backend.probes.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(backend.probes.load(Ordering::SeqCst), 3);

        monitor.stop();
        assert!(!monitor.is_running());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(backend.probes.load(Ordering::SeqCst), 3);
    }
}
