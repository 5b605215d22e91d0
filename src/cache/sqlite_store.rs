//! Structured persistent tier backed by SQLite
//!
//! Entries are kept as JSON alongside indexed `timestamp` and `date` columns
//! so old rows can be pruned without decoding them. All database work runs
//! on tokio's blocking pool.

use super::entry::CacheEntry;
use super::store::StoreError;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt::Debug;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS prayer_times (
    key TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    date TEXT NOT NULL,
    entry TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_prayer_times_timestamp ON prayer_times (timestamp);
CREATE INDEX IF NOT EXISTS idx_prayer_times_date ON prayer_times (date);
";

/// Asynchronous store for whole cache entries
#[async_trait]
pub trait EntryStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Inserts or replaces the entry for `key`
    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    /// Deletes entries created before `cutoff_ms`, returning how many went
    async fn prune_older_than(&self, cutoff_ms: i64) -> Result<usize, StoreError>;
}

/// SQLite implementation of [`EntryStore`]
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl EntryStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT entry FROM prayer_times WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;

            match raw {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        let key = key.to_string();
        let json = serde_json::to_string(entry)?;
        let timestamp = entry.timestamp;
        let date = entry.date.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO prayer_times (key, timestamp, date, entry)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     timestamp = excluded.timestamp,
                     date = excluded.date,
                     entry = excluded.entry",
                params![key, timestamp, date, json],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM prayer_times", [])?;
            Ok(())
        })
        .await
    }

    async fn prune_older_than(&self, cutoff_ms: i64) -> Result<usize, StoreError> {
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM prayer_times WHERE timestamp < ?1",
                params![cutoff_ms],
            )?;
            Ok(removed)
        })
        .await
    }
}
