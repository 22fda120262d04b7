//! Minimum spacing between network calls.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Serializes calls and keeps at least `min_interval` between the end of one
/// call and the start of the next.
pub struct Pacer {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    /// Creates a pacer.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Returns the configured interval.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Runs `call` once the interval since the previous call has elapsed.
    pub async fn run<F, T>(&self, call: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                debug!(wait_ms = (ready_at - Instant::now()).as_millis() as u64, "Pacing request");
                tokio::time::sleep_until(ready_at).await;
            }
        }

        let output = call.await;
        *last_call = Some(Instant::now());
        output
    }
}
