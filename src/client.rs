//! Prayer times client
//!
//! Combines the tiered cache, the in-flight registry and the upstream
//! provider. Cached results are returned immediately (and refreshed in the
//! background once they get old), concurrent requests for the same key share
//! one provider call, and failures fall back to whatever stale data exists.

use crate::cache::{generate_key, CacheManager, CacheStats, FetchResult};
use crate::data::{
    transform_response, AsrSchool, CalculationMethod, FetchError, LocationInfo,
    PrayerTimesData, PrayerTimesProvider, ProviderQuery,
};
use crate::location::Geocoder;
use crate::time::format_date;
use chrono::{Days, NaiveDate};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing knobs for the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Upper bound on a single provider call
    pub request_timeout: Duration,
    /// Cache hits older than this trigger a background refresh
    pub background_refresh_after: Duration,
    /// Entries older than this are reported as stale
    pub stale_after: Duration,
    /// Delay before a background refresh starts
    pub refresh_delay: Duration,
    /// Delay before the next day is pre-fetched
    pub prefetch_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            background_refresh_after: Duration::from_secs(4 * 60 * 60),
            stale_after: Duration::from_secs(6 * 60 * 60),
            refresh_delay: Duration::from_millis(100),
            prefetch_delay: Duration::from_secs(2),
        }
    }
}

/// What to fetch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub method: CalculationMethod,
    pub school: AsrSchool,
    pub date: NaiveDate,
}

impl FetchRequest {
    /// Request with the default method (ISNA) and school (Standard)
    pub fn new(latitude: f64, longitude: f64, date: NaiveDate) -> Self {
        Self {
            latitude,
            longitude,
            method: CalculationMethod::default(),
            school: AsrSchool::default(),
            date,
        }
    }

    /// Cache key for this request
    pub fn key(&self) -> String {
        generate_key(self.latitude, self.longitude, self.date, self.method)
    }

    /// Same request for another day
    pub fn for_date(self, date: NaiveDate) -> Self {
        Self { date, ..self }
    }

    fn query(&self) -> ProviderQuery {
        ProviderQuery {
            latitude: self.latitude,
            longitude: self.longitude,
            method: self.method,
            school: self.school,
            date: self.date,
        }
    }
}

/// How to fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Skip the cache lookup
    pub force_refresh: bool,
    /// Return `Ok(None)` instead of an error when nothing can be served
    pub silent: bool,
    /// Stop waiting when this token is cancelled; callers sharing the same
    /// provider call are unaffected
    pub cancel: Option<CancellationToken>,
    /// Pre-fetch the following day after a successful provider call
    pub prefetch_next_day: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            silent: false,
            cancel: None,
            prefetch_next_day: true,
        }
    }
}

/// Cached data together with whether it should be refreshed before use
#[derive(Debug, Clone, PartialEq)]
pub struct StaleData {
    pub data: PrayerTimesData,
    pub is_stale: bool,
}

/// Fetches prayer times through the cache
#[derive(Debug, Clone)]
pub struct PrayerTimesClient {
    cache: CacheManager,
    provider: Arc<dyn PrayerTimesProvider>,
    geocoder: Option<Arc<dyn Geocoder>>,
    config: ClientConfig,
}

impl PrayerTimesClient {
    pub fn new(cache: CacheManager, provider: Arc<dyn PrayerTimesProvider>) -> Self {
        Self {
            cache,
            provider,
            geocoder: None,
            config: ClientConfig::default(),
        }
    }

    /// Enables [`fetch_by_city`](Self::fetch_by_city)
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Today's date in the cache's timezone
    pub fn today(&self) -> NaiveDate {
        self.cache
            .clock()
            .now()
            .with_timezone(&self.cache.timezone())
            .date_naive()
    }

    /// Fetches one day of prayer times
    ///
    /// # Arguments
    /// * `request` - Location, method, school and date
    /// * `options` - Cache bypass, silent mode, cancellation and pre-fetching
    ///
    /// # Returns
    /// * `Ok(Some(data))` - Fresh, cached, or stale fallback data
    /// * `Ok(None)` - Only in silent mode, when nothing could be served
    /// * `Err(FetchError)` - The provider failed and no cached data exists,
    ///   or the request was cancelled
    ///
    /// # Behavior
    /// - A cache hit is returned at once; if older than the background
    ///   refresh age, a silent forced refresh is scheduled
    /// - Concurrent calls for the same key share one provider call
    /// - A successful provider call schedules a pre-fetch of the next day
    /// - On failure, any stale cached entry is returned instead
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        options: FetchOptions,
    ) -> Result<Option<PrayerTimesData>, FetchError> {
        let key = request.key();

        if !options.force_refresh {
            if let Some(entry) = self.cache.get(&key).await {
                let age = entry.age_ms(self.cache.clock().now_ms());
                if age > as_ms(self.config.background_refresh_after) {
                    self.schedule_background_refresh(*request, &key);
                }
                return Ok(Some(entry.data));
            }
        }

        let (pending, is_leader) = self.cache.join_or_register_inflight(&key, || {
            self.retrieve(*request, key.clone())
        });

        // Cancelling only stops this caller waiting; the shared call carries on
        // for everyone else joined to it.
        let outcome = match &options.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(FetchError::Cancelled),
                outcome = pending => outcome,
            },
            None => pending.await,
        };

        match outcome {
            Ok(data) => {
                if is_leader && options.prefetch_next_day {
                    self.schedule_prefetch(*request);
                }
                Ok(Some(data))
            }
            Err(error) => {
                if let Some(stale) = self.cache.get_stale(&key) {
                    warn!(cache_key = %key, error = %error, "Using stale cache due to error");
                    return Ok(Some(stale.data));
                }
                if options.silent {
                    warn!(cache_key = %key, error = %error, "Silent fetch failed");
                    return Ok(None);
                }
                Err(error)
            }
        }
    }

    /// Cached data from the synchronous tiers, for first paint
    pub fn cached_sync(&self, request: &FetchRequest) -> Option<PrayerTimesData> {
        self.cache.get_sync(&request.key()).map(|entry| entry.data)
    }

    /// Any cached data, even expired, flagged when it should be refreshed
    pub fn stale(&self, request: &FetchRequest) -> Option<StaleData> {
        let entry = self.cache.get_stale(&request.key())?;
        let too_old = entry.age_ms(self.cache.clock().now_ms()) > as_ms(self.config.stale_after);
        let is_stale = too_old || entry.date != format_date(request.date);
        Some(StaleData {
            data: entry.data,
            is_stale,
        })
    }

    /// Geocodes a city, then fetches prayer times for it
    pub async fn fetch_by_city(
        &self,
        city: &str,
        country: &str,
        method: CalculationMethod,
        school: AsrSchool,
        date: NaiveDate,
    ) -> Result<PrayerTimesData, FetchError> {
        let geocoder = self
            .geocoder
            .as_ref()
            .ok_or_else(|| FetchError::Provider("No geocoder configured".to_string()))?;
        let location = geocoder.search(city, country).await?;

        let request = FetchRequest {
            method,
            school,
            ..FetchRequest::new(location.latitude, location.longitude, date)
        };
        let mut data = self
            .fetch(&request, FetchOptions::default())
            .await?
            .ok_or_else(|| FetchError::Provider("No prayer times available".to_string()))?;

        data.location.city = location.city;
        data.location.country = location.country;
        Ok(data)
    }

    /// Empties every cache tier
    pub async fn clear_cache(&self) {
        self.cache.clear_all().await;
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Builds the provider call for `request`
    ///
    /// Returned as a boxed future so it can be stored in the in-flight
    /// registry and outlive the caller that started it.
    fn retrieve(&self, request: FetchRequest, key: String) -> BoxFuture<'static, FetchResult> {
        let provider = Arc::clone(&self.provider);
        let cache = self.cache.clone();
        let timeout = self.config.request_timeout;

        async move {
            let query = request.query();
            let response = tokio::time::timeout(timeout, provider.fetch(&query))
                .await
                .map_err(|_| FetchError::Timeout)??;

            let location = LocationInfo::new(request.latitude, request.longitude);
            let data = transform_response(
                response,
                &location,
                request.method,
                request.school,
                cache.timezone(),
            )?;

            cache
                .set(&key, data.clone(), location, request.date, request.method)
                .await;
            info!(cache_key = %key, "Fetched prayer times from provider");
            Ok(data)
        }
        .boxed()
    }

    fn schedule_background_refresh(&self, request: FetchRequest, key: &str) {
        if self.cache.has_inflight(key) {
            return;
        }
        debug!(cache_key = %key, "Scheduling background refresh");

        let client = self.clone();
        let delay = self.config.refresh_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let options = FetchOptions {
                force_refresh: true,
                silent: true,
                prefetch_next_day: false,
                ..FetchOptions::default()
            };
            if let Err(e) = client.fetch(&request, options).await {
                debug!(error = %e, "Background refresh failed");
            }
        });
    }

    fn schedule_prefetch(&self, request: FetchRequest) {
        let Some(next_day) = request.date.checked_add_days(Days::new(1)) else {
            return;
        };
        let next = request.for_date(next_day);
        let key = next.key();
        if self.cache.has_inflight(&key) || self.has_fresh_entry(&key) {
            return;
        }
        debug!(cache_key = %key, "Scheduling pre-fetch of next day");

        let client = self.clone();
        let delay = self.config.prefetch_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let options = FetchOptions {
                silent: true,
                prefetch_next_day: false,
                ..FetchOptions::default()
            };
            if let Err(e) = client.fetch(&next, options).await {
                debug!(error = %e, "Pre-fetch failed");
            }
        });
    }

    /// Whether the synchronous tiers hold a young enough entry for `key`
    ///
    /// The date check of a regular lookup would reject tomorrow's entry, so
    /// only presence and age are considered.
    fn has_fresh_entry(&self, key: &str) -> bool {
        let now = self.cache.clock().now_ms();
        self.cache
            .get_stale(key)
            .is_some_and(|entry| entry.age_ms(now) <= as_ms(self.config.background_refresh_after))
    }
}

fn as_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
