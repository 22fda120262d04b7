//! In-flight request coalescing.
//!
//! At most one pending request exists per normalized key. Callers arriving
//! while it is pending attach as waiters and receive the same result.

use std::collections::HashMap;

use tokio::sync::oneshot;

use whereabouts_core::types::AccountLocation;

/// Receives the value of a coalesced lookup.
pub type Waiter = oneshot::Receiver<Option<AccountLocation>>;

/// A key with a fetch queued or in flight.
#[derive(Debug)]
pub struct PendingRequest {
    /// Normalized key
    pub key: String,
    /// Request id of the queued fetch
    pub request_id: u64,
    waiters: Vec<oneshot::Sender<Option<AccountLocation>>>,
}

impl PendingRequest {
    /// Number of callers waiting on this request.
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

/// Tracks pending requests by key.
#[derive(Debug, Default)]
pub struct Coalescer {
    pending: HashMap<String, PendingRequest>,
}

impl Coalescer {
    /// Creates an empty coalescer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches to an existing pending request, if any.
    pub fn join(&mut self, key: &str) -> Option<Waiter> {
        let pending = self.pending.get_mut(key)?;
        let (tx, rx) = oneshot::channel();
        pending.waiters.push(tx);
        Some(rx)
    }

    /// Registers a new pending request with one waiter.
    ///
    /// The caller must have checked [`join`](Self::join) first; an existing
    /// request for `key` would otherwise be replaced and its waiters dropped.
    pub fn begin(&mut self, key: &str, request_id: u64) -> Waiter {
        debug_assert!(!self.pending.contains_key(key), "duplicate pending request for {key}");
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            key.to_string(),
            PendingRequest {
                key: key.to_string(),
                request_id,
                waiters: vec![tx],
            },
        );
        rx
    }

    /// Resolves every waiter for `key` with `value` and forgets the request.
    ///
    /// Returns the number of waiters that received the value.
    pub fn resolve(&mut self, key: &str, value: Option<AccountLocation>) -> usize {
        let Some(pending) = self.pending.remove(key) else {
            return 0;
        };

        pending
            .waiters
            .into_iter()
            .map(|tx| tx.send(value.clone()).is_ok())
            .filter(|delivered| *delivered)
            .count()
    }

    /// Returns the pending request for `key`.
    pub fn get(&self, key: &str) -> Option<&PendingRequest> {
        self.pending.get(key)
    }

    /// Returns true if a request for `key` is pending.
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    /// Number of keys with a pending request.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
