//! End-to-end scenarios over the public API
//!
//! A scripted provider stands in for the network; everything else is the
//! real cache, client and countdown.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tempfile::TempDir;

use prayerclock::cache::{CacheConfig, CacheManager, FileStore, SqliteStore};
use prayerclock::client::{FetchOptions, FetchRequest, PrayerTimesClient};
use prayerclock::countdown::current_and_next;
use prayerclock::data::provider::{UmmahData, UmmahLocation, UmmahPrayerTimes};
use prayerclock::data::{
    FetchError, PrayerName, PrayerTimesProvider, ProviderQuery, UmmahResponse,
};
use prayerclock::time::{Clock, ManualClock};

#[derive(Debug, Default)]
struct ScriptedProvider {
    calls: AtomicUsize,
    offline: AtomicBool,
}

#[async_trait]
impl PrayerTimesProvider for ScriptedProvider {
    async fn fetch(&self, query: &ProviderQuery) -> Result<UmmahResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable("network down".to_string()));
        }

        Ok(UmmahResponse {
            success: true,
            data: Some(UmmahData {
                date: query.date.format("%Y-%m-%d").to_string(),
                location: UmmahLocation {
                    latitude: query.latitude,
                    longitude: query.longitude,
                },
                calculation_method: Some("ISNA".to_string()),
                madhab: Some("Shafi".to_string()),
                prayer_times: UmmahPrayerTimes {
                    fajr: "09:10".to_string(),
                    sunrise: "09:25".to_string(),
                    dhuhr: "16:55".to_string(),
                    asr: "20:55".to_string(),
                    maghrib: "00:00".to_string(),
                    isha: "00:15".to_string(),
                },
            }),
            message: None,
        })
    }
}

struct Harness {
    client: PrayerTimesClient,
    provider: Arc<ScriptedProvider>,
    clock: Arc<ManualClock>,
    cache_dir: TempDir,
}

fn new_york() -> Tz {
    "America/New_York".parse().unwrap()
}

fn june_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

fn request() -> FetchRequest {
    FetchRequest::new(40.7128, -74.006, june_first())
}

fn no_prefetch() -> FetchOptions {
    FetchOptions {
        prefetch_next_day: false,
        ..FetchOptions::default()
    }
}

/// Client over on-disk page and structured tiers in `cache_dir`
fn client_over(
    cache_dir: &TempDir,
    provider: Arc<ScriptedProvider>,
    clock: Arc<ManualClock>,
) -> PrayerTimesClient {
    let page = Arc::new(FileStore::with_dir(cache_dir.path().to_path_buf()));
    let structured = SqliteStore::open(&cache_dir.path().join("prayer_times.sqlite3")).unwrap();
    let cache = CacheManager::new(
        page,
        Some(Arc::new(structured)),
        clock,
        new_york(),
        CacheConfig::default(),
    );
    PrayerTimesClient::new(cache, provider)
}

fn harness() -> Harness {
    let cache_dir = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::default());
    // 08:00 in New York
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let client = client_over(&cache_dir, provider.clone(), clock.clone());
    Harness {
        client,
        provider,
        clock,
        cache_dir,
    }
}

#[tokio::test]
async fn test_new_york_scenario() {
    let h = harness();
    assert_eq!(request().key(), "40.71_-74.01_2025-06-01_2");

    let data = h.client.fetch(&request(), no_prefetch()).await.unwrap().unwrap();
    let times: Vec<&str> = data.prayers.iter().map(|p| p.time.as_str()).collect();
    assert_eq!(times, ["05:10", "05:25", "12:55", "16:55", "20:00", "20:15"]);
    assert_eq!(data.prayer(PrayerName::Fajr).unwrap().name, "Fajr");
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);

    let again = h.client.fetch(&request(), no_prefetch()).await.unwrap().unwrap();
    assert_eq!(again, data);
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1, "second call is cached");

    let state = current_and_next(&data.prayers, h.clock.now_ms(), new_york()).unwrap();
    assert_eq!(state.current, PrayerName::Fajr);
    assert_eq!(state.next, PrayerName::Dhuhr);
}

#[tokio::test]
async fn test_concurrent_requests_are_deduplicated() {
    let h = harness();
    let rq = request();
    let calls = (0..8).map(|_| h.client.fetch(&rq, no_prefetch()));
    let results = futures::future::join_all(calls).await;

    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
    let first = results[0].as_ref().unwrap().clone();
    assert!(results.iter().all(|r| r.as_ref().unwrap() == &first));
}

#[tokio::test]
async fn test_structured_tier_is_promoted_after_restart() {
    let h = harness();
    h.client.fetch(&request(), no_prefetch()).await.unwrap();

    // Only the structured tier survives: drop the page files
    for entry in std::fs::read_dir(h.cache_dir.path()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "json") {
            std::fs::remove_file(path).unwrap();
        }
    }

    let restarted = client_over(&h.cache_dir, h.provider.clone(), h.clock.clone());
    assert!(restarted.cached_sync(&request()).is_none());

    let data = restarted.fetch(&request(), no_prefetch()).await.unwrap();
    assert!(data.is_some());
    assert_eq!(restarted.cache_stats().structured_hits, 1);
    assert!(
        restarted.cached_sync(&request()).is_some(),
        "structured hit is promoted into the synchronous tiers"
    );
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_offline_serves_stale_data_across_days() {
    let h = harness();
    let yesterday = h.client.fetch(&request(), no_prefetch()).await.unwrap().unwrap();

    // Next afternoon, offline
    h.clock
        .set(Utc.with_ymd_and_hms(2025, 6, 2, 18, 0, 0).unwrap());
    h.provider.offline.store(true, Ordering::SeqCst);

    let data = h.client.fetch(&request(), no_prefetch()).await.unwrap();
    assert_eq!(data, Some(yesterday), "expired entry is the fallback");
    assert!(h.client.stale(&request()).unwrap().is_stale);

    let unseen = request().for_date(NaiveDate::from_ymd_opt(2025, 6, 3).unwrap());
    let error = h.client.fetch(&unseen, no_prefetch()).await.unwrap_err();
    assert_eq!(error, FetchError::Unreachable("network down".to_string()));
}

#[tokio::test]
async fn test_yesterday_served_until_grace_hour() {
    let h = harness();
    h.client.fetch(&request(), no_prefetch()).await.unwrap();

    // 01:30 local on June 2 is inside the grace window
    h.clock
        .set(Utc.with_ymd_and_hms(2025, 6, 2, 5, 30, 0).unwrap());
    assert!(h.client.cached_sync(&request()).is_some());

    // 02:30 local is past it
    h.clock
        .set(Utc.with_ymd_and_hms(2025, 6, 2, 6, 30, 0).unwrap());
    assert!(h.client.cached_sync(&request()).is_none());
}
