//! In-memory lookup cache with debounced persistence.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use whereabouts_core::config::CacheConfig;
use whereabouts_core::traits::PersistentStore;
use whereabouts_core::types::{normalize_key, AccountLocation, CacheEntry};

use crate::store::MemoryStore;

struct CacheInner {
    entries: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    store: Arc<dyn PersistentStore>,
    /// Armed flush timer; a new write aborts and re-arms it.
    pending_flush: Mutex<Option<JoinHandle<()>>>,
    /// Serializes saves so snapshots reach the store in order.
    flush_lock: tokio::sync::Mutex<()>,
}

impl CacheInner {
    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry.age_at(now) > self.config.ttl(entry.is_error)
    }

    /// Drops the oldest entries until the cap holds.
    ///
    /// On equal timestamps `newest` is evicted last.
    fn enforce_capacity(&self, entries: &mut HashMap<String, CacheEntry>, newest: Option<&str>) {
        let max = self.config.max_entries;
        if entries.len() <= max {
            return;
        }

        let mut candidates: Vec<(DateTime<Utc>, bool, String)> = entries
            .values()
            .map(|e| (e.timestamp, Some(e.key.as_str()) == newest, e.key.clone()))
            .collect();
        candidates.sort();

        let excess = entries.len() - max;
        for (_, _, key) in candidates.into_iter().take(excess) {
            entries.remove(&key);
        }
        debug!(evicted = excess, remaining = entries.len(), "Evicted oldest cache entries");
    }

    async fn flush(&self) {
        let _guard = self.flush_lock.lock().await;
        let snapshot = self.entries.read().clone();

        match self.store.save(&snapshot).await {
            Ok(()) => debug!(count = snapshot.len(), "Flushed cache"),
            Err(e) => warn!(error = %e, "Failed to flush cache, continuing in memory"),
        }
    }
}

/// Lookup cache keyed by normalized key.
///
/// Cheap to clone; clones share the same entries and store.
#[derive(Clone)]
pub struct LookupCache {
    inner: Arc<CacheInner>,
}

impl LookupCache {
    /// Creates an empty cache backed by `store` without loading from it.
    pub fn new(config: CacheConfig, store: Arc<dyn PersistentStore>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(HashMap::new()),
                config,
                store,
                pending_flush: Mutex::new(None),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Creates a memory-only cache.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    /// Creates a cache and populates it from `store`.
    ///
    /// Entries that already outlived their TTL are skipped and the size cap is
    /// applied. A failing store yields an empty cache.
    #[instrument(skip_all)]
    pub async fn load(config: CacheConfig, store: Arc<dyn PersistentStore>) -> Self {
        let cache = Self::new(config, store);

        match cache.inner.store.load().await {
            Ok(persisted) => {
                let now = Utc::now();
                let mut entries = cache.inner.entries.write();
                for (key, mut entry) in persisted {
                    if cache.inner.is_expired(&entry, now) {
                        continue;
                    }
                    entry.key = normalize_key(&key);
                    entries.insert(entry.key.clone(), entry);
                }
                cache.inner.enforce_capacity(&mut entries, None);
                debug!(count = entries.len(), "Loaded cache from store");
            }
            Err(e) => warn!(error = %e, "Failed to load cache, starting empty"),
        }

        cache
    }

    /// Returns the live entry for `key`.
    ///
    /// An expired entry is removed on the spot and reported as absent.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let normalized = normalize_key(key);
        let now = Utc::now();

        {
            let entries = self.inner.entries.read();
            match entries.get(&normalized) {
                None => return None,
                Some(entry) if !self.inner.is_expired(entry, now) => return Some(entry.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.inner.entries.write();
        if entries
            .get(&normalized)
            .is_some_and(|e| self.inner.is_expired(e, now))
        {
            entries.remove(&normalized);
            debug!(key = %normalized, "Evicted expired entry");
        }
        None
    }

    /// Stores a lookup result, replacing any previous entry for the key.
    pub fn set(&self, key: &str, value: Option<AccountLocation>, is_error: bool) {
        self.insert(CacheEntry::new(key, value, is_error));
    }

    /// Stores a prepared entry as-is (its timestamp is kept).
    pub fn insert(&self, entry: CacheEntry) {
        {
            let mut entries = self.inner.entries.write();
            let key = entry.key.clone();
            entries.insert(key.clone(), entry);
            self.inner.enforce_capacity(&mut entries, Some(&key));
        }
        self.schedule_flush();
    }

    /// Removes a cached entry.
    pub fn remove(&self, key: &str) {
        let normalized = normalize_key(key);
        if self.inner.entries.write().remove(&normalized).is_some() {
            self.schedule_flush();
        }
    }

    /// Clears all cached entries.
    pub fn clear(&self) {
        self.inner.entries.write().clear();
        self.schedule_flush();
    }

    /// Removes all expired entries, scheduling a flush if any were dropped.
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        let removed = {
            let mut entries = self.inner.entries.write();
            let before = entries.len();
            entries.retain(|_, e| !self.inner.is_expired(e, now));
            before - entries.len()
        };
        debug!(removed, "Cleaned up expired entries");

        if removed > 0 {
            self.schedule_flush();
        }
    }

    /// Persists the current state immediately.
    ///
    /// Safe to call at any time, including while writes continue. Store
    /// failures are logged and swallowed.
    #[instrument(skip(self))]
    pub async fn flush(&self) {
        if let Some(handle) = self.inner.pending_flush.lock().take() {
            handle.abort();
        }
        self.inner.flush().await;
    }

    /// Arms (or re-arms) the debounced flush timer.
    fn schedule_flush(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime, skipping scheduled flush");
            return;
        };

        let inner = Arc::clone(&self.inner);
        let delay = self.inner.config.flush_debounce();
        let mut pending = self.inner.pending_flush.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Detached: re-arming the timer must not cancel a save midway.
            tokio::spawn(async move { inner.flush().await });
        }));
    }

    /// Returns the number of cached entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let entries = self.inner.entries.read();
        let expired = entries.values().filter(|e| self.inner.is_expired(e, now)).count();
        let errors = entries.values().filter(|e| e.is_error).count();

        CacheStats {
            total_entries: entries.len(),
            error_entries: errors,
            expired_entries: expired,
            valid_entries: entries.len().saturating_sub(expired),
            capacity: self.inner.config.max_entries,
        }
    }
}

/// Cache statistics.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Total entries (including expired)
    pub total_entries: usize,
    /// Entries recording a failed lookup
    pub error_entries: usize,
    /// Expired entries not yet cleaned up
    pub expired_entries: usize,
    /// Valid (non-expired) entries
    pub valid_entries: usize,
    /// Maximum capacity
    pub capacity: usize,
}
