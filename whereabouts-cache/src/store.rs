//! Persistent store backends for the lookup cache.
//!
//! - [`MemoryStore`]: keeps the last saved snapshot in process (tests, memory-only mode)
//! - [`FileStore`]: a versioned JSON document on disk, written atomically

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use whereabouts_core::error::{Result, WhereaboutsError};
use whereabouts_core::traits::PersistentStore;
use whereabouts_core::types::CacheEntry;

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// In-process store.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    saves: AtomicU64,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose loads and saves always fail.
    pub fn failing() -> Self {
        let store = Self::default();
        store.failing.store(true, Ordering::SeqCst);
        store
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Returns the last saved snapshot.
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        self.entries.read().clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WhereaboutsError::StoreError("store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn load(&self) -> Result<HashMap<String, CacheEntry>> {
        self.check()?;
        Ok(self.entries.read().clone())
    }

    async fn save(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
        self.check()?;
        *self.entries.write() = entries.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Current file format version
const VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u8,
    entries: HashMap<String, CacheEntry>,
}

/// JSON file store.
///
/// # File Format
///
/// ```text
/// { "version": 1, "entries": { "<key>": { "key", "value", "is_error", "timestamp" } } }
/// ```
///
/// Timestamps are epoch milliseconds. Saves go to a temp file that is then
/// renamed over the target, so a crash never leaves a torn file behind.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store at `path`. The file is created on first save.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistentStore for FileStore {
    #[instrument(skip(self), fields(path = ?self.path))]
    async fn load(&self) -> Result<HashMap<String, CacheEntry>> {
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache file yet");
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        let file: StoreFile = serde_json::from_slice(&contents)?;
        if file.version != VERSION {
            return Err(WhereaboutsError::StoreError(format!(
                "unsupported cache file version: expected {}, got {}",
                VERSION, file.version
            )));
        }

        debug!(count = file.entries.len(), "Loaded cache file");
        Ok(file.entries)
    }

    #[instrument(skip(self, entries), fields(path = ?self.path, count = entries.len()))]
    async fn save(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
        let file = StoreFile {
            version: VERSION,
            entries: entries.clone(),
        };
        let serialized = serde_json::to_vec(&file)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut out = fs::File::create(&temp_path).await?;
        out.write_all(&serialized).await?;
        out.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;

        debug!("Cache file saved");
        Ok(())
    }
}
