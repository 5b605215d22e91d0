//! Cache entries, keys and statistics

use crate::data::{CalculationMethod, LocationInfo, PrayerTimesData};
use crate::time::format_date;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Prefix applied to prayer entries in the page-persistent tier
pub const KEY_PREFIX: &str = "prayer_";

/// One cached day of prayer times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: PrayerTimesData,
    /// When the entry was created, epoch milliseconds
    pub timestamp: i64,
    pub location: LocationInfo,
    /// Calendar date the entry is for, `YYYY-MM-DD`
    pub date: String,
    /// Calculation method id
    pub method: u8,
    /// `timestamp` plus the memory-tier lifetime (informational)
    pub expires_at: i64,
}

impl CacheEntry {
    /// Milliseconds elapsed since the entry was created
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp
    }
}

/// Builds the cache key for a location, day and calculation method
///
/// Coordinates are rounded to two decimal places (roughly 1 km) and rendered
/// in their shortest form, so `40.70` becomes `40.7` and `-0.001` becomes `0`.
/// Exact halves round up, toward positive infinity.
///
/// # Example
/// `(40.7128, -74.006, 2025-06-01, ISNA)` gives `40.71_-74.01_2025-06-01_2`
pub fn generate_key(
    latitude: f64,
    longitude: f64,
    date: NaiveDate,
    method: CalculationMethod,
) -> String {
    format!(
        "{}_{}_{}_{}",
        round_coordinate(latitude),
        round_coordinate(longitude),
        format_date(date),
        method.id()
    )
}

fn round_coordinate(value: f64) -> f64 {
    // Adding zero turns -0.0 into 0.0
    (value * 100.0 + 0.5).floor() / 100.0 + 0.0
}

/// Key an entry is stored under in the page-persistent tier
pub(crate) fn page_key(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

/// Snapshot of cache effectiveness counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, zero before any lookup
    pub hit_rate: f64,
    pub memory_hits: u64,
    pub page_hits: u64,
    pub structured_hits: u64,
}

impl CacheStats {
    pub(crate) fn update_hit_rate(&mut self) {
        let total = self.hits + self.misses;
        self.hit_rate = if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn june_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn test_generate_key_new_york() {
        let key = generate_key(40.7128, -74.006, june_first(), CalculationMethod::Isna);
        assert_eq!(key, "40.71_-74.01_2025-06-01_2");
    }

    #[test]
    fn test_generate_key_is_idempotent_for_nearby_points() {
        let a = generate_key(40.7128, -74.006, june_first(), CalculationMethod::Isna);
        let b = generate_key(40.7149, -74.0051, june_first(), CalculationMethod::Isna);
        assert_eq!(a, b);
    }

    #[test]
    fn test_generate_key_uses_shortest_form() {
        let key = generate_key(40.7, -74.0, june_first(), CalculationMethod::MuslimWorldLeague);
        assert_eq!(key, "40.7_-74_2025-06-01_3");
    }

    #[test]
    fn test_generate_key_normalises_negative_zero() {
        let key = generate_key(-0.001, 0.001, june_first(), CalculationMethod::Isna);
        assert_eq!(key, "0_0_2025-06-01_2");
    }

    #[test]
    fn test_generate_key_rounds_halves_up() {
        let key = generate_key(0.125, -0.125, june_first(), CalculationMethod::Isna);
        assert_eq!(key, "0.13_-0.12_2025-06-01_2");
    }

    #[test]
    fn test_generate_key_differs_by_method_and_date() {
        let isna = generate_key(21.42, 39.83, june_first(), CalculationMethod::Isna);
        let umm = generate_key(21.42, 39.83, june_first(), CalculationMethod::UmmAlQura);
        let next = generate_key(
            21.42,
            39.83,
            june_first().succ_opt().unwrap(),
            CalculationMethod::Isna,
        );
        assert_ne!(isna, umm);
        assert_ne!(isna, next);
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats::default();
        stats.update_hit_rate();
        assert_eq!(stats.hit_rate, 0.0);

        stats.hits = 3;
        stats.misses = 1;
        stats.update_hit_rate();
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_page_key_prefix() {
        assert_eq!(page_key("1_2_2025-06-01_2"), "prayer_1_2_2025-06-01_2");
    }
}
