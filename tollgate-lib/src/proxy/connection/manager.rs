use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::telemetry::Metrics;

use super::guards::ConnectionGuard;

/// Errors that can occur when trying to accept a connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Server is shutting down")]
    Shutdown,
}

/// Tracks live connections so shutdown can wait for them to drain
pub struct ConnectionManager {
    active_connections: Arc<AtomicUsize>,
    shutting_down: AtomicBool,
    connections_closed_tx: watch::Sender<()>,
    connections_closed_rx: watch::Receiver<()>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (connections_closed_tx, connections_closed_rx) = watch::channel(());
        Self {
            active_connections: Arc::new(AtomicUsize::new(0)),
            shutting_down: AtomicBool::new(false),
            connections_closed_tx,
            connections_closed_rx,
        }
    }

    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stop accepting connections
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    /// Try to accept a new connection
    /// Returns Ok(guard) if connection is accepted, Err(ConnectionError) if rejected
    pub fn try_accept(
        &self,
        metrics: Option<&Arc<Metrics>>,
    ) -> Result<ConnectionGuard, ConnectionError> {
        if self.is_shutdown() {
            return Err(ConnectionError::Shutdown);
        }

        self.active_connections.fetch_add(1, Ordering::AcqRel);

        if let Some(m) = metrics {
            m.connections_total.add(1, &[]);
            m.connections_active.add(1, &[]);
        }

        Ok(ConnectionGuard::new(
            self.active_connections.clone(),
            self.connections_closed_tx.clone(),
            metrics.map(|m| m.connections_active.clone()),
        ))
    }

    /// Wait until every connection has closed or `timeout` elapses.
    ///
    /// Returns the number of connections still open.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut closed = self.connections_closed_rx.clone();
        let wait = async {
            while self.active() > 0 {
                if closed.changed().await.is_err() {
                    break;
                }
            }
        };

        info!(
            active_connections = self.active(),
            "Waiting for active connections to finish (timeout: {}s)",
            timeout.as_secs()
        );
        if tokio::time::timeout(timeout, wait).await.is_err() {
            let active = self.active();
            warn!(
                active_connections = active,
                "Shutdown timeout reached, {} connections still active", active
            );
            return active;
        }
        info!("All connections closed, shutdown complete");
        0
    }
}
