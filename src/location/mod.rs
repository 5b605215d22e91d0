//! User location resolution
//!
//! Works out where prayer times should be computed for: a cached location
//! when one exists, otherwise a fresh fix from a [`GeolocationSource`] with
//! best-effort city and country labels from a [`Geocoder`]. The last known
//! location is kept in memory and in the page store so it survives restarts.

mod geocode;
mod source;

pub use geocode::{GeocodeError, Geocoder, NominatimGeocoder, PlaceLabels, DEFAULT_GEOCODER_URL};
pub use source::{
    GeolocationSource, IpGeolocation, NoGeolocation, Position, PositionOptions,
    StaticGeolocation, DEFAULT_IP_LOOKUP_URL,
};

use crate::cache::PageStore;
use crate::data::LocationInfo;
use crate::time::Clock;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Page-store key holding the last known location
pub const LOCATION_KEY: &str = "last_location";

/// Moves shorter than this keep the cached location
pub const SIGNIFICANT_MOVE_KM: f64 = 5.0;

/// Mean Earth radius used for distances
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Why a position could not be obtained
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable")]
    PositionUnavailable,

    #[error("Location request timed out")]
    Timeout,

    #[error("Location error: {0}")]
    Unknown(String),
}

/// Great-circle distance between two points in kilometres
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Single-slot location cache: memory first, then the page store
#[derive(Debug)]
pub struct LocationCache {
    memory: Mutex<Option<LocationInfo>>,
    store: Arc<dyn PageStore>,
}

impl LocationCache {
    pub fn new(store: Arc<dyn PageStore>) -> Self {
        Self {
            memory: Mutex::new(None),
            store,
        }
    }

    /// Returns the cached location, loading it from the page store if needed
    pub fn get(&self) -> Option<LocationInfo> {
        if let Some(location) = self.memory().clone() {
            return Some(location);
        }

        let raw = match self.store.get(LOCATION_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read saved location");
                return None;
            }
        };

        match serde_json::from_str::<LocationInfo>(&raw) {
            Ok(location) => {
                *self.memory() = Some(location.clone());
                Some(location)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable saved location");
                None
            }
        }
    }

    /// Replaces the cached location in memory and on disk
    pub fn set(&self, location: LocationInfo) {
        match serde_json::to_string(&location) {
            Ok(json) => {
                if let Err(e) = self.store.set(LOCATION_KEY, &json) {
                    warn!(error = %e, "Failed to save location");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize location"),
        }
        *self.memory() = Some(location);
    }

    pub fn clear(&self) {
        *self.memory() = None;
        if let Err(e) = self.store.remove(LOCATION_KEY) {
            warn!(error = %e, "Failed to remove saved location");
        }
    }

    fn memory(&self) -> MutexGuard<'_, Option<LocationInfo>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolves and caches the user's location
#[derive(Debug)]
pub struct LocationResolver {
    cache: LocationCache,
    source: Arc<dyn GeolocationSource>,
    geocoder: Option<Arc<dyn Geocoder>>,
    clock: Arc<dyn Clock>,
    options: PositionOptions,
    /// Last fix from the source and when it was taken (epoch ms)
    last_fix: Mutex<Option<(Position, i64)>>,
}

impl LocationResolver {
    /// Creates a resolver
    ///
    /// # Arguments
    /// * `store` - Page store holding the `last_location` slot
    /// * `source` - Where fresh positions come from
    /// * `geocoder` - Optional reverse geocoder for city/country labels
    /// * `clock` - Used to age position fixes
    pub fn new(
        store: Arc<dyn PageStore>,
        source: Arc<dyn GeolocationSource>,
        geocoder: Option<Arc<dyn Geocoder>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache: LocationCache::new(store),
            source,
            geocoder,
            clock,
            options: PositionOptions::default(),
            last_fix: Mutex::new(None),
        }
    }

    /// Overrides the position timeout and maximum fix age
    pub fn with_options(mut self, options: PositionOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the cached location, or obtains and caches a fresh one
    pub async fn resolve(&self) -> Result<LocationInfo, LocationError> {
        if let Some(location) = self.cache.get() {
            debug!("Using cached location");
            return Ok(location);
        }
        self.request_location().await
    }

    /// Asks the source for a fresh position
    ///
    /// The cache is only replaced when the new position is more than
    /// [`SIGNIFICANT_MOVE_KM`] from the cached one.
    ///
    /// # Returns
    /// The location callers should use: the new one after a significant
    /// move, otherwise the cached one
    pub async fn request_location(&self) -> Result<LocationInfo, LocationError> {
        let position = self.current_position().await?;
        let mut location = LocationInfo::new(position.latitude, position.longitude);

        if !self.has_moved_significantly(&location) {
            if let Some(cached) = self.cache.get() {
                return Ok(cached);
            }
        }

        if let Some(geocoder) = &self.geocoder {
            match geocoder.reverse(position.latitude, position.longitude).await {
                Ok(labels) => {
                    location.city = labels.city;
                    location.country = labels.country;
                }
                Err(e) => debug!(error = %e, "Reverse geocoding failed, continuing without labels"),
            }
        }

        info!(location = %location.label(), "Location updated");
        self.cache.set(location.clone());
        Ok(location)
    }

    /// Whether `candidate` is far enough from the cached location to matter
    ///
    /// Always true when nothing is cached.
    pub fn has_moved_significantly(&self, candidate: &LocationInfo) -> bool {
        match self.cache.get() {
            Some(cached) => {
                haversine_km(
                    cached.latitude,
                    cached.longitude,
                    candidate.latitude,
                    candidate.longitude,
                ) > SIGNIFICANT_MOVE_KM
            }
            None => true,
        }
    }

    /// Stores a user-provided location
    pub fn set_manual_location(
        &self,
        latitude: f64,
        longitude: f64,
        city: Option<String>,
        country: Option<String>,
    ) -> LocationInfo {
        let location = LocationInfo {
            city,
            country,
            ..LocationInfo::new(latitude, longitude)
        };
        self.cache.set(location.clone());
        location
    }

    /// Cached location without asking the source
    pub fn cached(&self) -> Option<LocationInfo> {
        self.cache.get()
    }

    /// Forgets the cached location and any recent fix
    pub fn clear(&self) {
        self.cache.clear();
        *self.last_fix.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Reuses a recent fix or asks the source, bounded by the timeout
    async fn current_position(&self) -> Result<Position, LocationError> {
        let now = self.clock.now_ms();
        let max_age = i64::try_from(self.options.maximum_age.as_millis()).unwrap_or(i64::MAX);

        let recent = *self.last_fix.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((position, taken_at)) = recent {
            if now - taken_at <= max_age {
                return Ok(position);
            }
        }

        let position = tokio::time::timeout(
            self.options.timeout,
            self.source.current_position(&self.options),
        )
        .await
        .map_err(|_| LocationError::Timeout)??;

        *self.last_fix.lock().unwrap_or_else(PoisonError::into_inner) = Some((position, now));
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::time::ManualClock;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Source returning a settable position and counting calls
    #[derive(Debug)]
    struct FakeSource {
        position: Mutex<Result<Position, LocationError>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn at(latitude: f64, longitude: f64) -> Arc<Self> {
            Arc::new(Self {
                position: Mutex::new(Ok(Position {
                    latitude,
                    longitude,
                })),
                calls: AtomicUsize::new(0),
            })
        }

        fn move_to(&self, latitude: f64, longitude: f64) {
            *self.position.lock().unwrap() = Ok(Position {
                latitude,
                longitude,
            });
        }
    }

    #[async_trait]
    impl GeolocationSource for FakeSource {
        async fn current_position(
            &self,
            _options: &PositionOptions,
        ) -> Result<Position, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.position.lock().unwrap().clone()
        }
    }

    #[derive(Debug)]
    struct FakeGeocoder;

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn reverse(&self, _lat: f64, _lon: f64) -> Result<PlaceLabels, GeocodeError> {
            Ok(PlaceLabels {
                city: Some("New York".to_string()),
                country: Some("United States".to_string()),
            })
        }

        async fn search(&self, city: &str, _country: &str) -> Result<LocationInfo, GeocodeError> {
            Err(GeocodeError::NotFound(city.to_string()))
        }
    }

    #[derive(Debug)]
    struct FailingGeocoder;

    #[async_trait]
    impl Geocoder for FailingGeocoder {
        async fn reverse(&self, _lat: f64, _lon: f64) -> Result<PlaceLabels, GeocodeError> {
            Err(GeocodeError::Invalid("down".to_string()))
        }

        async fn search(&self, city: &str, _country: &str) -> Result<LocationInfo, GeocodeError> {
            Err(GeocodeError::NotFound(city.to_string()))
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn test_haversine_known_distance() {
        // New York to London is roughly 5570 km
        let d = haversine_km(40.7128, -74.006, 51.5074, -0.1278);
        assert!((d - 5570.0).abs() < 15.0, "distance was {}", d);
        assert_eq!(haversine_km(10.0, 10.0, 10.0, 10.0), 0.0);
    }

    #[tokio::test]
    async fn test_resolve_fetches_labels_and_caches() {
        let store = Arc::new(MemoryStore::new());
        let source = FakeSource::at(40.7128, -74.006);
        let resolver = LocationResolver::new(
            store.clone(),
            source.clone(),
            Some(Arc::new(FakeGeocoder)),
            clock(),
        );

        let location = resolver.resolve().await.unwrap();
        assert_eq!(location.city.as_deref(), Some("New York"));
        assert!(store.get(LOCATION_KEY).unwrap().is_some());

        // Second resolve is served from the cache
        resolver.resolve().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_loads_persisted_location() {
        let store = Arc::new(MemoryStore::new());
        let saved = LocationInfo::new(23.81, 90.41);
        store
            .set(LOCATION_KEY, &serde_json::to_string(&saved).unwrap())
            .unwrap();

        let source = FakeSource::at(0.0, 0.0);
        let resolver = LocationResolver::new(store, source.clone(), None, clock());

        assert_eq!(resolver.resolve().await.unwrap(), saved);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_geocoder_failure_omits_labels() {
        let resolver = LocationResolver::new(
            Arc::new(MemoryStore::new()),
            FakeSource::at(1.0, 2.0),
            Some(Arc::new(FailingGeocoder)),
            clock(),
        );
        let location = resolver.resolve().await.unwrap();
        assert_eq!(location, LocationInfo::new(1.0, 2.0));
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let source = FakeSource::at(0.0, 0.0);
        *source.position.lock().unwrap() = Err(LocationError::PermissionDenied);
        let resolver =
            LocationResolver::new(Arc::new(MemoryStore::new()), source, None, clock());

        assert_eq!(
            resolver.resolve().await.unwrap_err(),
            LocationError::PermissionDenied
        );
    }

    #[tokio::test]
    async fn test_request_location_ignores_small_moves() {
        let clock = clock();
        let source = FakeSource::at(40.7128, -74.006);
        let resolver = LocationResolver::new(
            Arc::new(MemoryStore::new()),
            source.clone(),
            None,
            clock.clone(),
        );
        let first = resolver.request_location().await.unwrap();

        // About 1 km north, after the previous fix has aged out
        source.move_to(40.7218, -74.006);
        clock.advance(ChronoDuration::minutes(10));
        let second = resolver.request_location().await.unwrap();
        assert_eq!(second, first);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // About 11 km north replaces the cache
        source.move_to(40.8128, -74.006);
        clock.advance(ChronoDuration::minutes(10));
        let third = resolver.request_location().await.unwrap();
        assert_eq!(third.latitude, 40.8128);
        assert_eq!(resolver.cached().unwrap().latitude, 40.8128);
    }

    #[tokio::test]
    async fn test_recent_fix_is_reused() {
        let clock = clock();
        let source = FakeSource::at(1.0, 1.0);
        let resolver = LocationResolver::new(
            Arc::new(MemoryStore::new()),
            source.clone(),
            None,
            clock.clone(),
        );

        resolver.request_location().await.unwrap();
        clock.advance(ChronoDuration::minutes(4));
        resolver.request_location().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        clock.advance(ChronoDuration::minutes(2));
        resolver.request_location().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        #[derive(Debug)]
        struct SlowSource;

        #[async_trait]
        impl GeolocationSource for SlowSource {
            async fn current_position(
                &self,
                _options: &PositionOptions,
            ) -> Result<Position, LocationError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(LocationError::PositionUnavailable)
            }
        }

        let resolver = LocationResolver::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SlowSource),
            None,
            clock(),
        )
        .with_options(PositionOptions {
            timeout: Duration::from_millis(20),
            maximum_age: Duration::ZERO,
        });

        assert_eq!(resolver.resolve().await.unwrap_err(), LocationError::Timeout);
    }

    #[test]
    fn test_has_moved_significantly_without_cache() {
        let resolver = LocationResolver::new(
            Arc::new(MemoryStore::new()),
            FakeSource::at(0.0, 0.0),
            None,
            clock(),
        );
        assert!(resolver.has_moved_significantly(&LocationInfo::new(0.0, 0.0)));

        resolver.set_manual_location(0.0, 0.0, None, None);
        assert!(!resolver.has_moved_significantly(&LocationInfo::new(0.01, 0.01)));
        assert!(resolver.has_moved_significantly(&LocationInfo::new(0.1, 0.0)));
    }

    #[test]
    fn test_manual_location_and_clear() {
        let store = Arc::new(MemoryStore::new());
        let resolver =
            LocationResolver::new(store.clone(), FakeSource::at(0.0, 0.0), None, clock());

        let location = resolver.set_manual_location(
            21.4225,
            39.8262,
            Some("Makkah".to_string()),
            Some("Saudi Arabia".to_string()),
        );
        assert_eq!(resolver.cached(), Some(location));

        resolver.clear();
        assert!(resolver.cached().is_none());
        assert!(store.get(LOCATION_KEY).unwrap().is_none());
    }
}
