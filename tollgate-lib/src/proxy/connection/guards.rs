use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Guard to decrement active connections counter when dropped
/// Also notifies when the last connection closes (for graceful shutdown)
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
    connections_active: Option<opentelemetry::metrics::UpDownCounter<i64>>,
}

impl ConnectionGuard {
    pub fn new(
        counter: Arc<AtomicUsize>,
        notifier: watch::Sender<()>,
        connections_active: Option<opentelemetry::metrics::UpDownCounter<i64>>,
    ) -> Self {
        Self { counter, notifier, connections_active }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.counter.fetch_sub(1, Ordering::AcqRel);
        if let Some(ref counter) = self.connections_active {
            counter.add(-1, &[]);
        }
        // Notify when the last connection closes
        if remaining == 1 {
            self.notifier.send_replace(());
        }
    }
}
