//! Shared fakes for unit tests

use crate::cache::{CacheConfig, CacheManager, MemoryStore, SqliteStore};
use crate::client::{ClientConfig, FetchRequest, PrayerTimesClient};
use crate::data::provider::{UmmahData, UmmahLocation, UmmahPrayerTimes, UmmahResponse};
use crate::data::{FetchError, PrayerTimesProvider, ProviderQuery};
use crate::time::{format_date, ManualClock};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// UTC times a provider returns for New York on 2025-06-01
pub(crate) const NEW_YORK_UTC_TIMES: [&str; 6] =
    ["09:10", "09:25", "16:55", "20:55", "00:00", "00:15"];

/// Provider that counts calls and can be made to fail or stall
#[derive(Debug, Default)]
pub(crate) struct FakeProvider {
    calls: AtomicUsize,
    fail_with: Mutex<Option<FetchError>>,
    delay: Mutex<Duration>,
}

impl FakeProvider {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_with(&self, error: Option<FetchError>) {
        *self.fail_with.lock().unwrap() = error;
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl PrayerTimesProvider for FakeProvider {
    async fn fetch(&self, query: &ProviderQuery) -> Result<UmmahResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.fail_with.lock().unwrap().clone() {
            return Err(error);
        }

        let [fajr, sunrise, dhuhr, asr, maghrib, isha] = NEW_YORK_UTC_TIMES.map(String::from);
        Ok(UmmahResponse {
            success: true,
            data: Some(UmmahData {
                date: format_date(query.date),
                location: UmmahLocation {
                    latitude: query.latitude,
                    longitude: query.longitude,
                },
                calculation_method: Some("ISNA".to_string()),
                madhab: Some("Shafi".to_string()),
                prayer_times: UmmahPrayerTimes {
                    fajr,
                    sunrise,
                    dhuhr,
                    asr,
                    maghrib,
                    isha,
                },
            }),
            message: None,
        })
    }
}

pub(crate) struct Fixture {
    pub client: PrayerTimesClient,
    pub provider: Arc<FakeProvider>,
    pub clock: Arc<ManualClock>,
}

/// New York client with the clock at 2025-06-01 08:00 local
pub(crate) fn new_york_fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let tz: Tz = "America/New_York".parse().unwrap();
    let cache = CacheManager::new(
        Arc::new(MemoryStore::new()),
        Some(Arc::new(SqliteStore::open_in_memory().unwrap())),
        clock.clone(),
        tz,
        CacheConfig::default(),
    );
    let provider = Arc::new(FakeProvider::default());
    let client = PrayerTimesClient::new(cache, provider.clone()).with_config(ClientConfig {
        request_timeout: Duration::from_millis(200),
        refresh_delay: Duration::from_millis(5),
        prefetch_delay: Duration::from_millis(5),
        ..ClientConfig::default()
    });
    Fixture {
        client,
        provider,
        clock,
    }
}

/// Request for New York on 2025-06-01
pub(crate) fn new_york_request() -> FetchRequest {
    FetchRequest::new(40.7128, -74.006, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
}
