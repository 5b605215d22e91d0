//! Approximate Gregorian to Hijri conversion
//!
//! Uses the arithmetical (tabular) Islamic calendar with the civil epoch of
//! 16 July 622 and the common 30-year leap cycle. This tracks the Umm al-Qura
//! calendar to within a day for most dates and never by more than two; it is
//! meant for display only. Announcements based on moon sighting can and do
//! differ.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Julian Day Number of 1 Muharram 1 AH (civil epoch)
const ISLAMIC_EPOCH_JDN: i64 = 1_948_440;

/// Offset between chrono's days-from-CE count and the Julian Day Number
const CE_TO_JDN: i64 = 1_721_425;

const MONTHS: [(&str, &str); 12] = [
    ("Muharram", "محرم"),
    ("Safar", "صفر"),
    ("Rabi al-Awwal", "ربيع الأول"),
    ("Rabi al-Thani", "ربيع الثاني"),
    ("Jumada al-Awwal", "جمادى الأولى"),
    ("Jumada al-Thani", "جمادى الثانية"),
    ("Rajab", "رجب"),
    ("Shaban", "شعبان"),
    ("Ramadan", "رمضان"),
    ("Shawwal", "شوال"),
    ("Dhul Qadah", "ذو القعدة"),
    ("Dhul Hijjah", "ذو الحجة"),
];

/// Weekday names starting from Sunday
const WEEKDAYS: [(&str, &str); 7] = [
    ("Al-Ahad", "الأحد"),
    ("Al-Ithnayn", "الإثنين"),
    ("Al-Thulatha", "الثلاثاء"),
    ("Al-Arbia", "الأربعاء"),
    ("Al-Khamis", "الخميس"),
    ("Al-Jumah", "الجمعة"),
    ("Al-Sabt", "السبت"),
];

/// Hijri month with English and Arabic names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HijriMonth {
    /// Month number, 1 (Muharram) to 12 (Dhul Hijjah)
    pub number: u32,
    pub en: String,
    pub ar: String,
}

/// Weekday with English and Arabic names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HijriWeekday {
    pub en: String,
    pub ar: String,
}

/// An approximate Hijri calendar date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HijriDate {
    /// `D-M-YYYY`, e.g. `1-9-1445`
    pub date: String,
    pub day: u32,
    pub month: HijriMonth,
    pub year: i64,
    pub weekday: HijriWeekday,
}

impl HijriDate {
    /// Human readable form, e.g. `1 Ramadan 1445 AH`
    pub fn formatted(&self) -> String {
        format!("{} {} {} AH", self.day, self.month.en, self.year)
    }
}

/// Julian Day Number of a tabular Islamic date
fn islamic_to_jdn(year: i64, month: i64, day: i64) -> i64 {
    // ceil(29.5 * (month - 1)) in integer form
    let month_days = (59 * (month - 1) + 1) / 2;
    day + month_days + (year - 1) * 354 + (3 + 11 * year).div_euclid(30) + ISLAMIC_EPOCH_JDN - 1
}

/// Converts a Gregorian date to an approximate Hijri date
///
/// Dates before the Islamic epoch are not meaningful here and produce year
/// values of zero or below.
pub fn gregorian_to_hijri(date: NaiveDate) -> HijriDate {
    let jdn = i64::from(date.num_days_from_ce()) + CE_TO_JDN;

    let year = (30 * (jdn - ISLAMIC_EPOCH_JDN) + 10646).div_euclid(10631);
    let year_start = islamic_to_jdn(year, 1, 1);
    let month = ((((jdn - (29 + year_start)) as f64) / 29.5).ceil() as i64 + 1).clamp(1, 12);
    let day = jdn - islamic_to_jdn(year, month, 1) + 1;

    let (month_en, month_ar) = MONTHS[(month - 1) as usize];
    let (weekday_en, weekday_ar) = WEEKDAYS[date.weekday().num_days_from_sunday() as usize];

    HijriDate {
        date: format!("{}-{}-{}", day, month, year),
        day: day as u32,
        month: HijriMonth {
            number: month as u32,
            en: month_en.to_string(),
            ar: month_ar.to_string(),
        },
        year,
        weekday: HijriWeekday {
            en: weekday_en.to_string(),
            ar: weekday_ar.to_string(),
        },
    }
}
