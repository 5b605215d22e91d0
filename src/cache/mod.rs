//! Cache module for prayer-time results
//!
//! This module provides a three-tier cache: an in-process map, a synchronous
//! page-persistent store (one JSON file per key on disk), and a structured
//! SQLite store. Each tier has its own maximum age. Stale entries remain
//! readable through [`CacheManager::get_stale`] so the application can fall
//! back to them when the provider is unavailable.

mod entry;
mod file_store;
mod inflight;
mod manager;
mod sqlite_store;
mod store;

pub use entry::{generate_key, CacheEntry, CacheStats, KEY_PREFIX};
pub use file_store::FileStore;
pub use inflight::{InflightRegistry, SharedResult};
pub use manager::{CacheConfig, CacheManager, FetchResult};
pub use sqlite_store::{EntryStore, SqliteStore};
pub use store::{MemoryStore, PageStore, StoreError};
