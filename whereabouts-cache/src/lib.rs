//! TTL lookup cache for whereabouts.
//!
//! Success and error entries expire on separate clocks, the cache is bounded
//! with oldest-first eviction, and writes are flushed to a [`PersistentStore`]
//! after a debounce window.
//!
//! [`PersistentStore`]: whereabouts_core::PersistentStore

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod cache;
mod store;

pub use cache::{CacheStats, LookupCache};
pub use store::{FileStore, MemoryStore};
