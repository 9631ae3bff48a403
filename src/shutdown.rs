//! Shutdown signaling
//!
//! Process-wide cancellation token. Every long-running task holds a clone
//! and races its suspension points against [`ShutdownSignal::wait`].

use std::sync::Arc;
use tokio::sync::watch;

/// Shutdown signal for graceful termination
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Idempotent.
    pub fn request_shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Check if shutdown was requested
    pub fn is_shutdown_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once shutdown has been requested (immediately if it already was).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|requested| *requested).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
