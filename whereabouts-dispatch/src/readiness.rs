//! Session readiness gate.

use async_trait::async_trait;
use tokio::sync::watch;

use whereabouts_core::traits::SessionReadiness;

/// A flag flipped once when the session becomes usable.
#[derive(Debug)]
pub struct SessionGate {
    ready: watch::Sender<bool>,
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGate {
    /// Creates a gate that is not ready yet.
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self { ready }
    }

    /// Creates a gate that is already open.
    pub fn new_ready() -> Self {
        let (ready, _) = watch::channel(true);
        Self { ready }
    }

    /// Opens the gate and wakes everything waiting on it.
    ///
    /// Returns true if it was closed before.
    pub fn mark_ready(&self) -> bool {
        !self.ready.send_replace(true)
    }
}

#[async_trait]
impl SessionReadiness for SessionGate {
    fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    async fn ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}
