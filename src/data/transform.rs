//! Provider response to `PrayerTimesData` conversion

use super::provider::{FetchError, UmmahResponse};
use super::{
    AsrSchool, CalculationMethod, DateInfo, GregorianDate, LocationInfo, MetaInfo, MethodInfo,
    PrayerName, PrayerTime, PrayerTimesData,
};
use crate::time::{gregorian_to_hijri, local_timestamp_ms, parse_date, parse_hhmm, utc_to_local};
use chrono::{Days, NaiveDate};
use chrono_tz::Tz;

/// Converts a raw provider response into local-time prayer data
///
/// Every UTC time is converted to `tz` and anchored to the provider's date.
/// A prayer whose local timestamp would sort before its predecessor is moved
/// to the following calendar day, so the result is always ascending.
///
/// # Arguments
/// * `response` - Raw provider envelope
/// * `requested` - Location the request was made for; its labels are kept
/// * `method` - Calculation method the request used
/// * `school` - Asr school the request used
/// * `tz` - Timezone to present times in
///
/// # Returns
/// * `Err(FetchError::Provider)` - The envelope reports failure, or a date or
///   time could not be parsed
pub fn transform_response(
    response: UmmahResponse,
    requested: &LocationInfo,
    method: CalculationMethod,
    school: AsrSchool,
    tz: Tz,
) -> Result<PrayerTimesData, FetchError> {
    let data = match response.data {
        Some(data) if response.success => data,
        _ => {
            let message = response.message.unwrap_or_else(|| "No results".to_string());
            return Err(FetchError::Provider(format!("API returned error: {}", message)));
        }
    };

    let date = parse_date(&data.date)
        .ok_or_else(|| FetchError::Provider(format!("Invalid date in response: {}", data.date)))?;

    let times = &data.prayer_times;
    let mut prayers = Vec::with_capacity(PrayerName::ALL.len());
    let mut previous: Option<i64> = None;

    for key in PrayerName::ALL {
        let utc_time = match key {
            PrayerName::Fajr => &times.fajr,
            PrayerName::Sunrise => &times.sunrise,
            PrayerName::Dhuhr => &times.dhuhr,
            PrayerName::Asr => &times.asr,
            PrayerName::Maghrib => &times.maghrib,
            PrayerName::Isha => &times.isha,
        };

        let local = utc_to_local(utc_time, &data.date, tz.name());
        let time = parse_hhmm(&local).ok_or_else(|| {
            FetchError::Provider(format!("Invalid {} time in response: {:?}", key.key(), utc_time))
        })?;

        let mut timestamp = local_timestamp_ms(date, time, tz);
        if previous.is_some_and(|prev| timestamp < prev) {
            timestamp = next_day(date)
                .map(|next| local_timestamp_ms(next, time, tz))
                .unwrap_or(timestamp);
        }
        previous = Some(timestamp);

        prayers.push(PrayerTime {
            key,
            name: key.display_name().to_string(),
            name_arabic: key.arabic_name().to_string(),
            time: time.format("%H:%M").to_string(),
            timestamp,
        });
    }

    let school_label = data
        .madhab
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| school.name().to_string());

    Ok(PrayerTimesData {
        prayers,
        date: DateInfo {
            gregorian: gregorian_info(date),
            hijri: gregorian_to_hijri(date),
        },
        location: LocationInfo {
            latitude: data.location.latitude,
            longitude: data.location.longitude,
            city: requested.city.clone(),
            country: requested.country.clone(),
            timezone: Some(tz.name().to_string()),
        },
        meta: MetaInfo {
            method: MethodInfo {
                id: method.id(),
                name: method.name().to_string(),
            },
            school: school_label,
            latitude_adjustment_method: "angle based".to_string(),
        },
    })
}

fn next_day(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(1))
}

fn gregorian_info(date: NaiveDate) -> GregorianDate {
    GregorianDate {
        date: date.format("%Y-%m-%d").to_string(),
        day: date.format("%d").to_string(),
        weekday: date.format("%A").to_string(),
        month: date.format("%B").to_string(),
        year: date.format("%Y").to_string(),
    }
}
