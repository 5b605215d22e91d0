//! UTC to local time conversion and display formatting

use chrono::{Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::str::FromStr;
use tracing::warn;

/// Clock style used when rendering prayer times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFormat {
    /// 12-hour clock with AM/PM suffix
    #[default]
    #[serde(rename = "12h")]
    H12,
    /// 24-hour clock
    #[serde(rename = "24h")]
    H24,
}

impl TimeFormat {
    /// Returns the other format
    pub fn toggled(self) -> Self {
        match self {
            TimeFormat::H12 => TimeFormat::H24,
            TimeFormat::H24 => TimeFormat::H12,
        }
    }
}

impl FromStr for TimeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "12h" | "12" => Ok(TimeFormat::H12),
            "24h" | "24" => Ok(TimeFormat::H24),
            other => Err(other.to_string()),
        }
    }
}

/// Formats a date as `YYYY-MM-DD`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses a `YYYY-MM-DD` date string
pub fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
}

/// Parses an `HH:MM` (or `H:MM`) clock time
///
/// Anything trailing the minutes, such as seconds or a zone label
/// (`"05:10 (EDT)"`), is ignored.
pub fn parse_hhmm(time: &str) -> Option<NaiveTime> {
    let mut parts = time.trim().splitn(2, ':');
    let hours: u32 = parts.next()?.trim().parse().ok()?;
    let rest = parts.next()?;
    let minutes: u32 = rest.get(..2)?.parse().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, 0)
}

/// Parses an IANA timezone name such as `America/New_York`
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Best-effort detection of the host's IANA timezone
///
/// Checks `TZ`, then `/etc/timezone`, then the `/etc/localtime` symlink.
pub fn system_timezone() -> Option<Tz> {
    if let Ok(name) = std::env::var("TZ") {
        if let Some(tz) = parse_timezone(name.trim_start_matches(':')) {
            return Some(tz);
        }
    }

    if let Ok(name) = fs::read_to_string("/etc/timezone") {
        if let Some(tz) = parse_timezone(&name) {
            return Some(tz);
        }
    }

    let target = fs::read_link("/etc/localtime").ok()?;
    let target = target.to_string_lossy();
    let (_, name) = target.split_once("zoneinfo/")?;
    parse_timezone(name)
}

/// Converts a provider UTC clock time to local time in an IANA timezone
///
/// The time is interpreted as UTC on `date` and rendered as 24-hour `HH:MM`
/// in `timezone`, so an evening UTC time may land on the previous local day
/// (or a morning one on the next). Empty, placeholder (`-`) or otherwise
/// unusable input is returned unchanged.
///
/// # Arguments
/// * `utc_time` - Time in `HH:MM` format, UTC
/// * `date` - Calendar date in `YYYY-MM-DD` format
/// * `timezone` - IANA timezone name, e.g. `Asia/Dhaka`
pub fn utc_to_local(utc_time: &str, date: &str, timezone: &str) -> String {
    if utc_time.is_empty() || utc_time == "-" {
        return utc_time.to_string();
    }

    let (Some(time), Some(day)) = (parse_hhmm(utc_time), parse_date(date)) else {
        warn!(utc_time, date, "Invalid time or date, leaving unconverted");
        return utc_time.to_string();
    };

    let Some(tz) = parse_timezone(timezone) else {
        warn!(timezone, "Unknown timezone, leaving time unconverted");
        return utc_time.to_string();
    };

    Utc.from_utc_datetime(&day.and_time(time))
        .with_timezone(&tz)
        .format("%H:%M")
        .to_string()
}

/// Epoch milliseconds for a local wall-clock time on a date in `tz`
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times that
/// fall inside a DST gap are shifted forward by an hour.
pub fn local_timestamp_ms(date: NaiveDate, time: NaiveTime, tz: Tz) -> i64 {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|| naive.and_utc().timestamp_millis()),
    }
}

/// Formats an `HH:MM` time in the requested clock style
///
/// 12-hour output drops the leading zero (`"5:10 AM"`); 24-hour output is
/// zero padded (`"05:10"`). Placeholders and unparsable values pass through.
pub fn format_prayer_time(time: &str, format: TimeFormat) -> String {
    let Some(parsed) = parse_hhmm(time) else {
        return time.to_string();
    };

    match format {
        TimeFormat::H24 => parsed.format("%H:%M").to_string(),
        TimeFormat::H12 => parsed.format("%-I:%M %p").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utc_midnight_in_utc_is_unchanged() {
        assert_eq!(utc_to_local("00:00", "2025-06-01", "UTC"), "00:00");
    }

    #[test]
    fn test_utc_to_new_york_summer_offset() {
        // EDT is UTC-4 in June
        assert_eq!(utc_to_local("09:10", "2025-06-01", "America/New_York"), "05:10");
    }

    #[test]
    fn test_utc_to_new_york_winter_offset() {
        // EST is UTC-5 in January
        assert_eq!(utc_to_local("09:10", "2025-01-15", "America/New_York"), "04:10");
    }

    #[test]
    fn test_early_utc_time_rolls_back_to_previous_local_day() {
        // 00:15 UTC on June 1 is 20:15 on May 31 in New York
        assert_eq!(utc_to_local("00:15", "2025-06-01", "America/New_York"), "20:15");
    }

    #[test]
    fn test_evening_utc_time_rolls_forward_in_positive_offset() {
        // 22:30 UTC is 04:30 the next day in Dhaka (UTC+6)
        assert_eq!(utc_to_local("22:30", "2025-12-31", "Asia/Dhaka"), "04:30");
    }

    #[test]
    fn test_half_hour_offset() {
        assert_eq!(utc_to_local("00:00", "2025-03-01", "Asia/Kolkata"), "05:30");
    }

    #[test]
    fn test_invalid_inputs_pass_through() {
        assert_eq!(utc_to_local("", "2025-06-01", "UTC"), "");
        assert_eq!(utc_to_local("-", "2025-06-01", "UTC"), "-");
        assert_eq!(utc_to_local("not a time", "2025-06-01", "UTC"), "not a time");
        assert_eq!(utc_to_local("25:00", "2025-06-01", "UTC"), "25:00");
        assert_eq!(utc_to_local("05:10", "June 1st", "UTC"), "05:10");
        assert_eq!(utc_to_local("05:10", "2025-06-01", "Mars/Olympus"), "05:10");
    }

    #[test]
    fn test_parse_hhmm_variants() {
        assert_eq!(parse_hhmm("05:10"), NaiveTime::from_hms_opt(5, 10, 0));
        assert_eq!(parse_hhmm("5:10"), NaiveTime::from_hms_opt(5, 10, 0));
        assert_eq!(parse_hhmm("05:10 (EDT)"), NaiveTime::from_hms_opt(5, 10, 0));
        assert_eq!(parse_hhmm("23:59:30"), NaiveTime::from_hms_opt(23, 59, 0));
        assert!(parse_hhmm("0510").is_none());
        assert!(parse_hhmm("12:7").is_none());
    }

    #[test]
    fn test_format_prayer_time_12h() {
        assert_eq!(format_prayer_time("05:10", TimeFormat::H12), "5:10 AM");
        assert_eq!(format_prayer_time("13:05", TimeFormat::H12), "1:05 PM");
        assert_eq!(format_prayer_time("00:30", TimeFormat::H12), "12:30 AM");
        assert_eq!(format_prayer_time("12:00", TimeFormat::H12), "12:00 PM");
    }

    #[test]
    fn test_format_prayer_time_24h_pads() {
        assert_eq!(format_prayer_time("5:10", TimeFormat::H24), "05:10");
        assert_eq!(format_prayer_time("-", TimeFormat::H24), "-");
    }

    #[test]
    fn test_time_format_from_str_and_toggle() {
        assert_eq!("12h".parse::<TimeFormat>(), Ok(TimeFormat::H12));
        assert_eq!("24H".parse::<TimeFormat>(), Ok(TimeFormat::H24));
        assert!("36h".parse::<TimeFormat>().is_err());
        assert_eq!(TimeFormat::H12.toggled(), TimeFormat::H24);
    }

    #[test]
    fn test_local_timestamp_ms_matches_utc_offset() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let time = NaiveTime::from_hms_opt(5, 10, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 9, 10, 0).unwrap();
        assert_eq!(local_timestamp_ms(date, time, tz), expected.timestamp_millis());
    }

    #[test]
    fn test_local_timestamp_ms_inside_dst_gap() {
        // 02:30 does not exist in New York on 2025-03-09
        let tz: Tz = "America/New_York".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let time = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 3, 9, 7, 30, 0).unwrap();
        assert_eq!(local_timestamp_ms(date, time, tz), expected.timestamp_millis());
    }

    #[test]
    fn test_format_and_parse_date() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        assert_eq!(format_date(date), "2025-01-05");
        assert_eq!(parse_date("2025-01-05"), Some(date));
        assert!(parse_date("05-01-2025").is_none());
    }
}
