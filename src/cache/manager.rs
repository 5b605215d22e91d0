//! Three-tier cache manager
//!
//! Lookups go memory, then the page-persistent store, then the structured
//! store, each with its own maximum age. A hit in a slower tier is promoted
//! into every faster one. Writes go through all three; failures in any tier
//! are logged and otherwise ignored.

use super::entry::{page_key, CacheEntry, CacheStats, KEY_PREFIX};
use super::inflight::{InflightRegistry, SharedResult};
use super::sqlite_store::EntryStore;
use super::store::{MemoryStore, PageStore, StoreError};
use crate::data::{CalculationMethod, FetchError, LocationInfo, PrayerTimesData};
use crate::time::{format_date, Clock};
use chrono::{Days, Timelike};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one retrieval, shared by every caller waiting on it
pub type FetchResult = Result<PrayerTimesData, FetchError>;

/// Lifetimes for each tier and the after-midnight grace window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub memory_ttl: Duration,
    pub page_ttl: Duration,
    pub structured_ttl: Duration,
    /// Local hour before which yesterday's entry is still served
    pub grace_hour: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl: Duration::from_secs(24 * 60 * 60),
            page_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            structured_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            grace_hour: 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Tier {
    Memory,
    Page,
    Structured,
}

/// Tiered cache for prayer-time entries plus the in-flight registry
///
/// Cheap to clone; clones share all state.
#[derive(Debug, Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    memory: Mutex<HashMap<String, CacheEntry>>,
    page: Arc<dyn PageStore>,
    structured: Option<Arc<dyn EntryStore>>,
    inflight: InflightRegistry<FetchResult>,
    stats: Mutex<CacheStats>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    config: CacheConfig,
}

impl CacheManager {
    /// Creates a cache manager over the given stores
    ///
    /// # Arguments
    /// * `page` - Page-persistent tier
    /// * `structured` - Structured tier; `None` runs with two tiers
    /// * `clock` - Source of "now" for expiry decisions
    /// * `tz` - Timezone that defines the local calendar day
    /// * `config` - Tier lifetimes
    pub fn new(
        page: Arc<dyn PageStore>,
        structured: Option<Arc<dyn EntryStore>>,
        clock: Arc<dyn Clock>,
        tz: Tz,
        config: CacheConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                memory: Mutex::new(HashMap::new()),
                page,
                structured,
                inflight: InflightRegistry::new(),
                stats: Mutex::new(CacheStats::default()),
                clock,
                tz,
                config,
            }),
        }
    }

    /// Creates a cache manager with only in-process tiers
    pub fn in_memory(clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            None,
            clock,
            tz,
            CacheConfig::default(),
        )
    }

    /// Clock used for expiry decisions
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Timezone defining the local calendar day
    pub fn timezone(&self) -> Tz {
        self.inner.tz
    }

    /// Looks an entry up in all three tiers
    ///
    /// Returns the first unexpired hit, promoting it into faster tiers.
    /// Counts a miss when no tier has a usable entry.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.lookup_sync(key) {
            return Some(entry);
        }

        if let Some(entry) = self.read_structured(key).await {
            if !self.is_expired(&entry, self.inner.config.structured_ttl) {
                debug!(cache_key = %key, "Structured tier hit, promoting");
                self.memory().insert(key.to_string(), entry.clone());
                self.write_page(key, &entry);
                self.record_hit(Tier::Structured);
                return Some(entry);
            }
        }

        debug!(cache_key = %key, "Cache miss");
        let mut stats = self.stats_guard();
        stats.misses += 1;
        stats.update_hit_rate();
        None
    }

    /// Looks an entry up in the memory and page tiers only
    ///
    /// Never suspends. Misses are not counted.
    pub fn get_sync(&self, key: &str) -> Option<CacheEntry> {
        self.lookup_sync(key)
    }

    /// Returns whatever the memory or page tier holds, ignoring age and date
    pub fn get_stale(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memory().get(key) {
            return Some(entry.clone());
        }
        self.read_page(key)
    }

    /// Writes a new entry to every tier
    ///
    /// The memory and page tiers are written before the first suspension
    /// point; the structured tier is awaited afterwards. Storage failures are
    /// logged and swallowed.
    pub async fn set(
        &self,
        key: &str,
        data: PrayerTimesData,
        location: LocationInfo,
        date: chrono::NaiveDate,
        method: CalculationMethod,
    ) {
        let now = self.inner.clock.now_ms();
        let entry = CacheEntry {
            data,
            timestamp: now,
            location,
            date: format_date(date),
            method: method.id(),
            expires_at: now + ms(self.inner.config.memory_ttl),
        };

        self.memory().insert(key.to_string(), entry.clone());
        self.write_page(key, &entry);

        if let Some(structured) = &self.inner.structured {
            if let Err(e) = structured.put(key, &entry).await {
                warn!(cache_key = %key, error = %e, "Structured tier write failed");
            }
        }
        debug!(cache_key = %key, "Cached prayer times");
    }

    /// Seeds the memory tier with an entry
    pub fn preload(&self, key: &str, entry: CacheEntry) {
        self.memory().insert(key.to_string(), entry);
    }

    /// Whether a retrieval is pending for `key`
    pub fn has_inflight(&self, key: &str) -> bool {
        self.inner.inflight.contains(key)
    }

    /// Handle to the pending retrieval for `key`
    pub fn get_inflight(&self, key: &str) -> Option<SharedResult<FetchResult>> {
        self.inner.inflight.get(key)
    }

    /// Registers a retrieval for `key`; it deregisters itself once settled
    pub fn set_inflight<F>(&self, key: &str, future: F) -> SharedResult<FetchResult>
    where
        F: Future<Output = FetchResult> + Send + 'static,
    {
        self.inner.inflight.register(key, future)
    }

    /// Joins the pending retrieval for `key` or registers a new one
    ///
    /// # Returns
    /// The shared handle and `true` if `make` was used
    pub fn join_or_register_inflight<F, M>(
        &self,
        key: &str,
        make: M,
    ) -> (SharedResult<FetchResult>, bool)
    where
        F: Future<Output = FetchResult> + Send + 'static,
        M: FnOnce() -> F,
    {
        self.inner.inflight.join_or_register(key, make)
    }

    /// Snapshot of hit/miss counters
    pub fn stats(&self) -> CacheStats {
        *self.stats_guard()
    }

    /// Empties every tier
    ///
    /// Only prayer entries are removed from the page tier; other keys (such
    /// as the saved location) are left alone.
    pub async fn clear_all(&self) {
        self.memory().clear();

        match self.inner.page.keys() {
            Ok(keys) => {
                for key in keys.iter().filter(|k| k.starts_with(KEY_PREFIX)) {
                    if let Err(e) = self.inner.page.remove(key) {
                        warn!(key = %key, error = %e, "Failed to remove page entry");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to list page entries"),
        }

        if let Some(structured) = &self.inner.structured {
            if let Err(e) = structured.clear().await {
                warn!(error = %e, "Failed to clear structured tier");
            }
        }
        info!("Cleared prayer times cache");
    }

    /// Deletes structured-tier entries older than that tier's lifetime
    ///
    /// # Returns
    /// Number of entries removed; zero when the tier is absent or fails
    pub async fn prune_expired(&self) -> usize {
        let Some(structured) = &self.inner.structured else {
            return 0;
        };
        let cutoff = self.inner.clock.now_ms() - ms(self.inner.config.structured_ttl);
        match structured.prune_older_than(cutoff).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, "Pruned expired structured entries");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "Failed to prune structured tier");
                0
            }
        }
    }

    /// Whether an entry is past `max_age` or for the wrong local day
    ///
    /// An entry dated yesterday stays valid until the grace hour, so the
    /// previous night's Isha can still be shown just after midnight.
    pub fn is_expired(&self, entry: &CacheEntry, max_age: Duration) -> bool {
        let now = self.inner.clock.now();
        let local = now.with_timezone(&self.inner.tz);
        let today = local.date_naive();

        if entry.date != format_date(today) {
            let within_grace = local.hour() < self.inner.config.grace_hour;
            let is_yesterday = today
                .checked_sub_days(Days::new(1))
                .is_some_and(|yesterday| entry.date == format_date(yesterday));
            return !(within_grace && is_yesterday);
        }

        entry.age_ms(now.timestamp_millis()) > ms(max_age)
    }

    fn lookup_sync(&self, key: &str) -> Option<CacheEntry> {
        let config = self.inner.config;

        let memory_hit = self
            .memory()
            .get(key)
            .filter(|entry| !self.is_expired(entry, config.memory_ttl))
            .cloned();
        if let Some(entry) = memory_hit {
            debug!(cache_key = %key, "Memory tier hit");
            self.record_hit(Tier::Memory);
            return Some(entry);
        }

        if let Some(entry) = self.read_page(key) {
            if !self.is_expired(&entry, config.page_ttl) {
                debug!(cache_key = %key, "Page tier hit, promoting");
                self.memory().insert(key.to_string(), entry.clone());
                self.record_hit(Tier::Page);
                return Some(entry);
            }
        }

        None
    }

    fn read_page(&self, key: &str) -> Option<CacheEntry> {
        let raw = match self.inner.page.get(&page_key(key)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Page tier read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Unreadable page entry");
                None
            }
        }
    }

    async fn read_structured(&self, key: &str) -> Option<CacheEntry> {
        let structured = self.inner.structured.as_ref()?;
        match structured.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Structured tier read failed");
                None
            }
        }
    }

    /// Writes to the page tier, pruning once and retrying if it is full
    fn write_page(&self, key: &str, entry: &CacheEntry) {
        let json = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        let stored_key = page_key(key);
        match self.inner.page.set(&stored_key, &json) {
            Ok(()) => {}
            Err(StoreError::QuotaExceeded { needed, limit }) => {
                info!(needed, limit, "Page tier full, pruning oldest entries");
                self.prune_page();
                if let Err(e) = self.inner.page.set(&stored_key, &json) {
                    warn!(cache_key = %key, error = %e, "Page tier write failed after prune");
                }
            }
            Err(e) => warn!(cache_key = %key, error = %e, "Page tier write failed"),
        }
    }

    /// Removes the oldest half (rounded up) of prayer entries in the page
    /// tier, plus any that cannot be parsed
    ///
    /// Returns how many entries were actually removed.
    fn prune_page(&self) -> usize {
        #[derive(Deserialize)]
        struct Stamp {
            #[serde(default)]
            timestamp: i64,
        }

        let keys = match self.inner.page.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list page entries for pruning");
                return 0;
            }
        };

        let mut removed = 0;
        let mut entries: Vec<(String, i64)> = Vec::new();
        for key in keys.into_iter().filter(|k| k.starts_with(KEY_PREFIX)) {
            let parsed = self
                .inner
                .page
                .get(&key)
                .ok()
                .flatten()
                .and_then(|raw| serde_json::from_str::<Stamp>(&raw).ok());

            match parsed {
                Some(stamp) => entries.push((key, stamp.timestamp)),
                None => {
                    debug!(key = %key, "Removing corrupt page entry");
                    removed += self.remove_page_entry(&key);
                }
            }
        }

        entries.sort_by_key(|(_, timestamp)| *timestamp);
        let remove_count = entries.len().div_ceil(2);
        for (key, _) in entries.iter().take(remove_count) {
            removed += self.remove_page_entry(key);
        }
        debug!(removed, "Pruned page tier");
        removed
    }

    fn remove_page_entry(&self, key: &str) -> usize {
        match self.inner.page.remove(key) {
            Ok(()) => 1,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to remove page entry");
                0
            }
        }
    }

    fn record_hit(&self, tier: Tier) {
        let mut stats = self.stats_guard();
        stats.hits += 1;
        match tier {
            Tier::Memory => stats.memory_hits += 1,
            Tier::Page => stats.page_hits += 1,
            Tier::Structured => stats.structured_hits += 1,
        }
        stats.update_hit_rate();
    }

    fn memory(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.inner
            .memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_guard(&self) -> MutexGuard<'_, CacheStats> {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
