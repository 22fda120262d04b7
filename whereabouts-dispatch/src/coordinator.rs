//! Lookup coordination.
//!
//! A lookup is answered from the cache, attached to a pending request for the
//! same key, or queued as a new fetch. Queued fetches are admitted FIFO under
//! the concurrency ceiling once the session is ready. Every completion writes
//! the cache, resolves all waiters and admits the next queued fetch.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use whereabouts_cache::{LookupCache, MemoryStore};
use whereabouts_core::config::WhereaboutsConfig;
use whereabouts_core::error::Result;
use whereabouts_core::traits::{Notifier, PersistentStore, RemoteFetch, SessionReadiness};
use whereabouts_core::types::{normalize_key, AccountLocation, FetchOutcome};

use crate::coalescer::Coalescer;
use crate::dispatcher::{DispatchStats, Dispatcher, QueueItem};
use crate::notifier::LogNotifier;
use crate::ratelimit::{RateLimitMonitor, RateLimitStatus};
use crate::readiness::SessionGate;

/// The collaborators a [`Coordinator`] is wired to.
pub struct Collaborators {
    /// Performs network calls
    pub fetcher: Arc<dyn RemoteFetch>,
    /// Persists the cache
    pub store: Arc<dyn PersistentStore>,
    /// Gates dispatch
    pub readiness: Arc<dyn SessionReadiness>,
    /// Presents the rate-limit countdown
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Uses `fetcher` with a memory store, an open gate and a logging notifier.
    pub fn new(fetcher: Arc<dyn RemoteFetch>) -> Self {
        Self {
            fetcher,
            store: Arc::new(MemoryStore::new()),
            readiness: Arc::new(SessionGate::new_ready()),
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Replaces the persistent store.
    pub fn with_store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = store;
        self
    }

    /// Replaces the readiness gate.
    pub fn with_readiness(mut self, readiness: Arc<dyn SessionReadiness>) -> Self {
        self.readiness = readiness;
        self
    }

    /// Replaces the notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

struct CoreState {
    coalescer: Coalescer,
    dispatcher: Dispatcher,
}

struct Inner {
    cache: LookupCache,
    /// Cache check, coalescing and enqueueing happen under this one lock.
    state: Mutex<CoreState>,
    fetcher: Arc<dyn RemoteFetch>,
    readiness: Arc<dyn SessionReadiness>,
    monitor: Arc<RateLimitMonitor>,
    config: WhereaboutsConfig,
    ticker: Mutex<Option<JoinHandle<()>>>,
    /// Waits for the session to become ready, then drains the queue.
    readiness_watch: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Admits queued fetches while capacity allows.
    fn drain(self: &Arc<Self>) {
        if !self.readiness.is_ready() {
            debug!("Session not ready, holding queue");
            return;
        }

        let admitted = self.state.lock().dispatcher.admit();
        for item in admitted {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                let outcome = AssertUnwindSafe(inner.fetcher.fetch(&item.key))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| FetchOutcome::Failure("fetch panicked".into()));
                inner.complete(item, outcome);
            });
        }
    }

    fn complete(self: &Arc<Self>, item: QueueItem, outcome: FetchOutcome) {
        let value = outcome.value();
        let delivered = {
            let mut state = self.state.lock();
            state.dispatcher.complete();
            self.cache.set(&item.key, value.clone(), outcome.is_error());
            state.coalescer.resolve(&item.key, value)
        };

        match &outcome {
            FetchOutcome::Success(found) => {
                debug!(key = %item.key, request_id = item.request_id, found = found.is_some(), delivered, "Lookup completed");
            }
            FetchOutcome::RateLimited { reset_at } => {
                warn!(key = %item.key, request_id = item.request_id, reset_at = ?reset_at, "Lookup rate limited");
                self.monitor.report(*reset_at);
            }
            FetchOutcome::Failure(reason) => {
                warn!(key = %item.key, request_id = item.request_id, reason = %reason, "Lookup failed");
            }
        }

        self.drain();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let tasks = [self.ticker.get_mut().take(), self.readiness_watch.get_mut().take()];
        for task in tasks.into_iter().flatten() {
            task.abort();
        }
    }
}

/// Drains the queue once `readiness` opens.
///
/// Holds only a weak reference so an abandoned coordinator can be dropped
/// while the session never becomes ready.
fn spawn_readiness_watch(readiness: Arc<dyn SessionReadiness>, inner: Weak<Inner>) -> JoinHandle<()> {
    tokio::spawn(async move {
        readiness.ready().await;
        if let Some(inner) = inner.upgrade() {
            info!("Session ready, resuming dispatch");
            inner.drain();
        }
    })
}

/// Deduplicating, bounded, cache-first lookup service.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Validates `config`, loads the cache from the store and starts the
    /// countdown ticker.
    ///
    /// Lookups made before the session is ready stay queued and are
    /// dispatched as soon as [`SessionReadiness::ready`] resolves.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn new(config: WhereaboutsConfig, parts: Collaborators) -> Result<Self> {
        config.validate()?;

        let cache = LookupCache::load(config.cache.clone(), parts.store).await;
        let monitor = Arc::new(RateLimitMonitor::new(
            parts.notifier,
            config.dispatch.rate_limit_fallback(),
        ));
        let ticker = monitor.spawn_ticker(config.dispatch.countdown_tick());

        info!(
            cached = cache.len(),
            max_concurrent = config.dispatch.max_concurrent,
            "Lookup coordinator started"
        );

        let inner = Arc::new(Inner {
            cache,
            state: Mutex::new(CoreState {
                coalescer: Coalescer::new(),
                dispatcher: Dispatcher::new(config.dispatch.max_concurrent),
            }),
            fetcher: parts.fetcher,
            readiness: parts.readiness.clone(),
            monitor,
            config,
            ticker: Mutex::new(Some(ticker)),
            readiness_watch: Mutex::new(None),
        });

        if !parts.readiness.is_ready() {
            info!("Session not ready, lookups will queue until it is");
        }
        let watch = spawn_readiness_watch(parts.readiness, Arc::downgrade(&inner));
        *inner.readiness_watch.lock() = Some(watch);

        Ok(Self { inner })
    }

    /// Resolves `key` to its metadata.
    ///
    /// Returns `None` when the account has no metadata, the lookup failed or
    /// the API throttled it. Concurrent lookups for the same key share one
    /// fetch.
    #[instrument(skip(self))]
    pub async fn lookup(&self, key: &str) -> Option<AccountLocation> {
        let key = normalize_key(key);
        if key.is_empty() {
            return None;
        }

        let waiter = {
            let mut state = self.inner.state.lock();
            if let Some(entry) = self.inner.cache.get(&key) {
                debug!(key, is_error = entry.is_error, "Cache hit");
                return entry.value;
            }
            match state.coalescer.join(&key) {
                Some(waiter) => {
                    debug!(key, "Joined pending lookup");
                    waiter
                }
                None => {
                    let item = state.dispatcher.enqueue(&key);
                    state.coalescer.begin(&key, item.request_id)
                }
            }
        };

        self.inner.drain();
        waiter.await.unwrap_or(None)
    }

    /// Drains the queue now.
    ///
    /// Readiness changes are picked up on their own; this only forces an
    /// extra pass.
    pub fn session_ready(&self) {
        self.inner.drain();
    }

    /// Dispatcher statistics.
    pub fn dispatch_stats(&self) -> DispatchStats {
        let state = self.inner.state.lock();
        DispatchStats {
            pending_keys: state.coalescer.len(),
            ..state.dispatcher.stats()
        }
    }

    /// Current rate-limit status.
    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.inner.monitor.status()
    }

    /// Closes the rate-limit countdown.
    pub fn dismiss_rate_limit(&self) {
        self.inner.monitor.dismiss();
    }

    /// The rate-limit monitor.
    pub fn monitor(&self) -> &Arc<RateLimitMonitor> {
        &self.inner.monitor
    }

    /// The lookup cache.
    pub fn cache(&self) -> &LookupCache {
        &self.inner.cache
    }

    /// The configuration in effect.
    pub fn config(&self) -> &WhereaboutsConfig {
        &self.inner.config
    }

    /// Writes the cache to the store now.
    pub async fn flush(&self) {
        self.inner.cache.flush().await;
    }

    /// Stops the countdown ticker and flushes the cache.
    pub async fn shutdown(&self) {
        if let Some(ticker) = self.inner.ticker.lock().take() {
            ticker.abort();
        }
        if let Some(watch) = self.inner.readiness_watch.lock().take() {
            watch.abort();
        }
        self.flush().await;
        info!("Lookup coordinator stopped");
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("cached", &self.inner.cache.len())
            .field("dispatch", &self.dispatch_stats())
            .finish()
    }
}
