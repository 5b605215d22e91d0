//! Core data models for prayerclock
//!
//! This module contains the prayer-time types shared by the cache, the
//! provider client and the countdown, plus the calculation parameters the
//! upstream provider understands.

pub mod provider;
pub mod transform;

pub use provider::{FetchError, HttpProvider, PrayerTimesProvider, ProviderQuery, UmmahResponse};
pub use transform::transform_response;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::HijriDate;

/// The six daily boundaries, in the order the day presents them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerName {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerName {
    /// Fixed display order
    pub const ALL: [PrayerName; 6] = [
        PrayerName::Fajr,
        PrayerName::Sunrise,
        PrayerName::Dhuhr,
        PrayerName::Asr,
        PrayerName::Maghrib,
        PrayerName::Isha,
    ];

    /// Lowercase key as used by the provider payload
    pub fn key(self) -> &'static str {
        match self {
            PrayerName::Fajr => "fajr",
            PrayerName::Sunrise => "sunrise",
            PrayerName::Dhuhr => "dhuhr",
            PrayerName::Asr => "asr",
            PrayerName::Maghrib => "maghrib",
            PrayerName::Isha => "isha",
        }
    }

    /// Capitalized English name
    pub fn display_name(self) -> &'static str {
        match self {
            PrayerName::Fajr => "Fajr",
            PrayerName::Sunrise => "Sunrise",
            PrayerName::Dhuhr => "Dhuhr",
            PrayerName::Asr => "Asr",
            PrayerName::Maghrib => "Maghrib",
            PrayerName::Isha => "Isha",
        }
    }

    /// Arabic name
    pub fn arabic_name(self) -> &'static str {
        match self {
            PrayerName::Fajr => "الفجر",
            PrayerName::Sunrise => "الشروق",
            PrayerName::Dhuhr => "الظهر",
            PrayerName::Asr => "العصر",
            PrayerName::Maghrib => "المغرب",
            PrayerName::Isha => "العشاء",
        }
    }

    /// Whether this boundary starts a prayer (sunrise is informational only)
    pub fn is_prayer(self) -> bool {
        self != PrayerName::Sunrise
    }
}

impl fmt::Display for PrayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One prayer boundary for a day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrayerTime {
    pub key: PrayerName,
    /// English display name
    pub name: String,
    /// Arabic display name
    pub name_arabic: String,
    /// Local civil time, `HH:MM` 24-hour
    pub time: String,
    /// Epoch milliseconds of the local time
    pub timestamp: i64,
}

/// Gregorian calendar descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GregorianDate {
    /// `YYYY-MM-DD`
    pub date: String,
    pub day: String,
    pub weekday: String,
    pub month: String,
    pub year: String,
}

/// Gregorian and Hijri descriptors for the day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInfo {
    pub gregorian: GregorianDate,
    pub hijri: HijriDate,
}

/// A user position with optional labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl LocationInfo {
    /// Creates a location with coordinates only
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            city: None,
            country: None,
            timezone: None,
        }
    }

    /// `City, Country` when known, otherwise the coordinates
    pub fn label(&self) -> String {
        match (&self.city, &self.country) {
            (Some(city), Some(country)) => format!("{}, {}", city, country),
            (Some(city), None) => city.clone(),
            (None, Some(country)) => country.clone(),
            (None, None) => format!("{:.4}, {:.4}", self.latitude, self.longitude),
        }
    }
}

/// Calculation method as echoed in results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub id: u8,
    pub name: String,
}

/// Calculation metadata for a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInfo {
    pub method: MethodInfo,
    pub school: String,
    pub latitude_adjustment_method: String,
}

/// A full day of prayer times
///
/// `prayers` always holds exactly six entries in `PrayerName::ALL` order,
/// ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrayerTimesData {
    pub prayers: Vec<PrayerTime>,
    pub date: DateInfo,
    pub location: LocationInfo,
    pub meta: MetaInfo,
}

impl PrayerTimesData {
    /// Looks up a prayer by key
    pub fn prayer(&self, key: PrayerName) -> Option<&PrayerTime> {
        self.prayers.iter().find(|p| p.key == key)
    }
}

/// Recognized astronomical conventions, keyed by provider id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CalculationMethod {
    ShiaIthnaAshari,
    Karachi,
    #[default]
    Isna,
    MuslimWorldLeague,
    UmmAlQura,
    Egyptian,
    Tehran,
    GulfRegion,
    Kuwait,
    Qatar,
    Singapore,
    France,
    Turkey,
    Russia,
    MoonsightingCommittee,
    Dubai,
}

impl CalculationMethod {
    /// All methods in id order
    pub const ALL: [CalculationMethod; 16] = [
        CalculationMethod::ShiaIthnaAshari,
        CalculationMethod::Karachi,
        CalculationMethod::Isna,
        CalculationMethod::MuslimWorldLeague,
        CalculationMethod::UmmAlQura,
        CalculationMethod::Egyptian,
        CalculationMethod::Tehran,
        CalculationMethod::GulfRegion,
        CalculationMethod::Kuwait,
        CalculationMethod::Qatar,
        CalculationMethod::Singapore,
        CalculationMethod::France,
        CalculationMethod::Turkey,
        CalculationMethod::Russia,
        CalculationMethod::MoonsightingCommittee,
        CalculationMethod::Dubai,
    ];

    /// Numeric id used in cache keys and by the provider
    pub fn id(self) -> u8 {
        match self {
            CalculationMethod::ShiaIthnaAshari => 0,
            CalculationMethod::Karachi => 1,
            CalculationMethod::Isna => 2,
            CalculationMethod::MuslimWorldLeague => 3,
            CalculationMethod::UmmAlQura => 4,
            CalculationMethod::Egyptian => 5,
            CalculationMethod::Tehran => 7,
            CalculationMethod::GulfRegion => 8,
            CalculationMethod::Kuwait => 9,
            CalculationMethod::Qatar => 10,
            CalculationMethod::Singapore => 11,
            CalculationMethod::France => 12,
            CalculationMethod::Turkey => 13,
            CalculationMethod::Russia => 14,
            CalculationMethod::MoonsightingCommittee => 15,
            CalculationMethod::Dubai => 16,
        }
    }

    /// Looks up a method by id
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }

    /// Full display name
    pub fn name(self) -> &'static str {
        match self {
            CalculationMethod::ShiaIthnaAshari => "Shia Ithna-Ashari",
            CalculationMethod::Karachi => "University of Islamic Sciences, Karachi",
            CalculationMethod::Isna => "Islamic Society of North America (ISNA)",
            CalculationMethod::MuslimWorldLeague => "Muslim World League",
            CalculationMethod::UmmAlQura => "Umm Al-Qura University, Makkah",
            CalculationMethod::Egyptian => "Egyptian General Authority of Survey",
            CalculationMethod::Tehran => "Institute of Geophysics, University of Tehran",
            CalculationMethod::GulfRegion => "Gulf Region",
            CalculationMethod::Kuwait => "Kuwait",
            CalculationMethod::Qatar => "Qatar",
            CalculationMethod::Singapore => "Majlis Ugama Islam Singapura, Singapore",
            CalculationMethod::France => "Union Organization Islamic de France",
            CalculationMethod::Turkey => "Diyanet İşleri Başkanlığı, Turkey",
            CalculationMethod::Russia => "Spiritual Administration of Muslims of Russia",
            CalculationMethod::MoonsightingCommittee => "Moonsighting Committee Worldwide",
            CalculationMethod::Dubai => "Dubai",
        }
    }

    /// Method token understood by the upstream provider
    ///
    /// Methods the provider does not support fall back to ISNA.
    pub fn provider_token(self) -> &'static str {
        match self {
            CalculationMethod::Karachi | CalculationMethod::MuslimWorldLeague => {
                "MuslimWorldLeague"
            }
            CalculationMethod::UmmAlQura => "UmmAlQura",
            CalculationMethod::Egyptian => "Egyptian",
            CalculationMethod::Tehran => "Tehran",
            CalculationMethod::GulfRegion => "Gulf",
            CalculationMethod::Kuwait => "Kuwait",
            CalculationMethod::Qatar => "Qatar",
            CalculationMethod::Singapore => "Singapore",
            CalculationMethod::France => "France",
            CalculationMethod::Turkey => "Turkey",
            CalculationMethod::Russia => "Russia",
            CalculationMethod::Isna
            | CalculationMethod::ShiaIthnaAshari
            | CalculationMethod::MoonsightingCommittee
            | CalculationMethod::Dubai => "ISNA",
        }
    }
}

impl TryFrom<u8> for CalculationMethod {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| format!("unknown calculation method id {}", id))
    }
}

impl From<CalculationMethod> for u8 {
    fn from(method: CalculationMethod) -> Self {
        method.id()
    }
}

/// Jurisprudential convention for the Asr time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AsrSchool {
    /// Shafi, Maliki, Hanbali
    #[default]
    Standard,
    Hanafi,
}

impl AsrSchool {
    pub fn id(self) -> u8 {
        match self {
            AsrSchool::Standard => 0,
            AsrSchool::Hanafi => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AsrSchool::Standard => "Standard",
            AsrSchool::Hanafi => "Hanafi",
        }
    }

    /// Madhab token understood by the upstream provider
    pub fn provider_token(self) -> &'static str {
        match self {
            AsrSchool::Standard => "Shafi",
            AsrSchool::Hanafi => "Hanafi",
        }
    }
}

impl TryFrom<u8> for AsrSchool {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(AsrSchool::Standard),
            1 => Ok(AsrSchool::Hanafi),
            other => Err(format!("unknown Asr school id {}", other)),
        }
    }
}

impl From<AsrSchool> for u8 {
    fn from(school: AsrSchool) -> Self {
        school.id()
    }
}
