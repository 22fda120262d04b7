//! FIFO admission under a concurrency ceiling.
//!
//! The dispatcher only does bookkeeping; the coordinator spawns the fetches
//! for the items it admits and reports completions back.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// A queued fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueItem {
    /// Normalized key
    pub key: String,
    /// Monotonically increasing id
    pub request_id: u64,
}

/// Dispatcher bookkeeping.
#[derive(Debug)]
pub struct Dispatcher {
    queue: VecDeque<QueueItem>,
    active: usize,
    limit: usize,
    peak_active: usize,
    next_request_id: u64,
    dispatched_total: u64,
    last_dispatch: Option<DateTime<Utc>>,
}

impl Dispatcher {
    /// Creates a dispatcher allowing `limit` concurrent fetches (at least one).
    pub fn new(limit: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            active: 0,
            limit: limit.max(1),
            peak_active: 0,
            next_request_id: 1,
            dispatched_total: 0,
            last_dispatch: None,
        }
    }

    /// Appends a fetch for `key` to the queue.
    pub fn enqueue(&mut self, key: &str) -> QueueItem {
        let item = QueueItem {
            key: key.to_string(),
            request_id: self.next_request_id,
        };
        self.next_request_id += 1;
        self.queue.push_back(item.clone());
        debug!(key, request_id = item.request_id, queued = self.queue.len(), "Enqueued fetch");
        item
    }

    /// Pops queued items in FIFO order while capacity allows.
    ///
    /// Every returned item counts as active until [`complete`](Self::complete).
    pub fn admit(&mut self) -> Vec<QueueItem> {
        let mut admitted = Vec::new();
        while self.active < self.limit {
            let Some(item) = self.queue.pop_front() else {
                break;
            };
            self.active += 1;
            self.dispatched_total += 1;
            admitted.push(item);
        }

        if !admitted.is_empty() {
            self.peak_active = self.peak_active.max(self.active);
            self.last_dispatch = Some(Utc::now());
            debug!(admitted = admitted.len(), active = self.active, queued = self.queue.len(), "Admitted fetches");
        }
        admitted
    }

    /// Marks one admitted fetch as finished.
    pub fn complete(&mut self) {
        self.active = self.active.saturating_sub(1);
    }

    /// Number of fetches in flight.
    pub fn active(&self) -> usize {
        self.active
    }

    /// Number of queued fetches.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Returns a stats snapshot.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            queued: self.queue.len(),
            active: self.active,
            limit: self.limit,
            peak_active: self.peak_active,
            dispatched_total: self.dispatched_total,
            last_dispatch: self.last_dispatch,
            pending_keys: 0,
        }
    }
}

/// Dispatcher statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Fetches waiting for admission
    pub queued: usize,
    /// Fetches in flight
    pub active: usize,
    /// Concurrency ceiling
    pub limit: usize,
    /// Highest observed number of fetches in flight
    pub peak_active: usize,
    /// Fetches admitted since creation
    pub dispatched_total: u64,
    /// Time of the last admission
    pub last_dispatch: Option<DateTime<Utc>>,
    /// Keys with a queued or in-flight fetch
    pub pending_keys: usize,
}
