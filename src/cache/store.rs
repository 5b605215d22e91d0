//! Page-persistent key/value storage
//!
//! The page tier is a synchronous string store in the spirit of browser local
//! storage: small, fast, and allowed to refuse writes once a byte quota is
//! reached. [`FileStore`](super::FileStore) backs it with one JSON file per
//! key; [`MemoryStore`] keeps everything in a map for tests and for runs where
//! no cache directory is available.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Errors raised by the cache storage tiers
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would take the store over its byte quota
    #[error("Storage quota exceeded: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded { needed: u64, limit: u64 },

    /// Filesystem failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be encoded or decoded
    #[error("Failed to serialize cache entry: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite failure in the structured tier
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Synchronous string store for the page-persistent tier
pub trait PageStore: Send + Sync + Debug {
    /// Reads a value, `Ok(None)` if the key is absent
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a value, replacing any previous one
    ///
    /// Fails with [`StoreError::QuotaExceeded`] when the store is full.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes a value; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Lists every stored key
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory page store with an optional byte quota
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryStore {
    /// Creates an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes beyond `quota_bytes` of values
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(limit) = self.quota_bytes {
            let used: u64 = values
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len() as u64)
                .sum();
            let needed = used + value.len() as u64;
            if needed > limit {
                return Err(StoreError::QuotaExceeded { needed, limit });
            }
        }

        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.keys().cloned().collect())
    }
}
