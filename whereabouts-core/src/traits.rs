//! Collaborator interfaces.
//!
//! The lookup core only talks to the outside world through these traits,
//! which keeps it testable with scripted in-memory implementations.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{CacheEntry, FetchOutcome};

// ═══════════════════════════════════════════════════════════════════════════════
// REMOTE FETCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Performs the network call for a single key.
///
/// Implementations own pacing: consecutive calls must be spaced by at least
/// the configured minimum interval. Timeouts are reported as
/// [`FetchOutcome::Failure`].
#[async_trait]
pub trait RemoteFetch: Send + Sync {
    /// Fetches metadata for a normalized key.
    async fn fetch(&self, key: &str) -> FetchOutcome;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTENT STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Blob store backing the lookup cache.
///
/// Used only when the cache is created and when it flushes. Failures are
/// logged by the caller and otherwise ignored.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Loads every persisted entry keyed by normalized key.
    async fn load(&self) -> Result<HashMap<String, CacheEntry>>;

    /// Replaces the persisted state with `entries`.
    async fn save(&self, entries: &HashMap<String, CacheEntry>) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION READINESS
// ═══════════════════════════════════════════════════════════════════════════════

/// Gates dispatch until the session can make authenticated calls.
///
/// Readiness only ever flips from not ready to ready.
#[async_trait]
pub trait SessionReadiness: Send + Sync {
    /// Returns true once credentials are available.
    fn is_ready(&self) -> bool;

    /// Resolves once [`is_ready`](Self::is_ready) returns true.
    async fn ready(&self);
}

// ═══════════════════════════════════════════════════════════════════════════════
// NOTIFIER
// ═══════════════════════════════════════════════════════════════════════════════

/// Presents the rate-limit countdown to the user.
///
/// All calls are fire-and-forget. They arrive in transition order while the
/// rate-limit state is locked, so implementations must not call back into it.
pub trait Notifier: Send + Sync {
    /// Shows a countdown ending at `reset_at`.
    fn show(&self, reset_at: DateTime<Utc>);

    /// Removes the countdown.
    fn hide(&self);

    /// Refreshes the countdown text while it is showing.
    fn countdown(&self, _remaining: Duration) {}
}
