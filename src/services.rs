//! Composition root
//!
//! Builds the stores, cache, client and location resolver once from a
//! [`Config`] so the rest of the program receives them already wired.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use thiserror::Error;
use tracing::warn;

use crate::cache::{CacheManager, EntryStore, FileStore, MemoryStore, PageStore, SqliteStore};
use crate::client::{FetchRequest, PrayerTimesClient};
use crate::config::{Config, ConfigError};
use crate::data::{AsrSchool, CalculationMethod, HttpProvider, LocationInfo, PrayerTimesProvider};
use crate::location::{
    GeocodeError, GeolocationSource, Geocoder, IpGeolocation, LocationError, LocationResolver,
    NominatimGeocoder, StaticGeolocation,
};
use crate::time::{Clock, SystemClock};

/// File name of the structured cache inside the cache directory
pub const DATABASE_FILE: &str = "prayer_times.sqlite3";

/// Errors from working out where to compute prayer times for
#[derive(Debug, Error)]
pub enum LocateError {
    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Geocode(#[from] GeocodeError),
}

/// Everything the front end needs, built from one configuration
#[derive(Debug, Clone)]
pub struct Services {
    pub client: PrayerTimesClient,
    pub location: Arc<LocationResolver>,
    pub method: CalculationMethod,
    pub school: AsrSchool,
    pub tz: Tz,
    pub cache_dir: Option<PathBuf>,
    geocoder: Arc<dyn Geocoder>,
    city: Option<(String, String)>,
    fixed_position: bool,
}

impl Services {
    /// Wires production services with the system clock
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let provider = Arc::new(HttpProvider::new(
            config.provider_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        ));
        Self::build(config, provider, Arc::new(SystemClock))
    }

    /// Wires services around a given provider and clock
    pub fn build(
        config: &Config,
        provider: Arc<dyn PrayerTimesProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let tz = config.tz()?;
        let cache_dir = config.cache_dir();

        let page: Arc<dyn PageStore> = match &cache_dir {
            Some(dir) => Arc::new(FileStore::with_dir(dir.clone()).with_quota(config.page_quota_bytes)),
            None => {
                warn!("No cache directory available, caching in memory only");
                Arc::new(MemoryStore::with_quota(config.page_quota_bytes))
            }
        };
        let structured = cache_dir.as_deref().and_then(open_structured_store);

        let cache = CacheManager::new(
            Arc::clone(&page),
            structured,
            Arc::clone(&clock),
            tz,
            config.cache_config(),
        );

        let geocoder: Arc<dyn Geocoder> = Arc::new(NominatimGeocoder::new(
            config.geocoder_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        ));
        let client = PrayerTimesClient::new(cache, provider)
            .with_geocoder(Arc::clone(&geocoder))
            .with_config(config.client_config());

        let source: Arc<dyn GeolocationSource> = match config.coordinates() {
            Some((latitude, longitude)) => Arc::new(StaticGeolocation::new(latitude, longitude)),
            None => Arc::new(IpGeolocation::new(config.ip_lookup_url.clone())),
        };
        let location = Arc::new(LocationResolver::new(
            page,
            source,
            Some(Arc::clone(&geocoder)),
            clock,
        ));

        Ok(Self {
            client,
            location,
            method: config.calculation_method()?,
            school: config.asr_school()?,
            tz,
            cache_dir,
            geocoder,
            city: config
                .city
                .clone()
                .map(|city| (city, config.country.clone().unwrap_or_default())),
            fixed_position: config.coordinates().is_some(),
        })
    }

    /// Works out the location to compute prayer times for
    ///
    /// Configured coordinates win, then a configured city, then the cached
    /// or detected location.
    pub async fn locate(&self) -> Result<LocationInfo, LocateError> {
        if self.fixed_position {
            return Ok(self.location.request_location().await?);
        }
        if let Some((city, country)) = &self.city {
            let found = self.geocoder.search(city, country).await?;
            return Ok(self.location.set_manual_location(
                found.latitude,
                found.longitude,
                found.city.or_else(|| Some(city.clone())),
                found.country.or_else(|| (!country.is_empty()).then(|| country.clone())),
            ));
        }
        Ok(self.location.resolve().await?)
    }

    /// Request for `location` on `date` with the configured method and school
    pub fn request_for(&self, location: &LocationInfo, date: NaiveDate) -> FetchRequest {
        FetchRequest {
            method: self.method,
            school: self.school,
            ..FetchRequest::new(location.latitude, location.longitude, date)
        }
    }
}

fn open_structured_store(dir: &Path) -> Option<Arc<dyn EntryStore>> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!(error = %e, "Failed to create cache directory");
        return None;
    }
    match SqliteStore::open(&dir.join(DATABASE_FILE)) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, "Structured cache unavailable, continuing without it");
            None
        }
    }
}
