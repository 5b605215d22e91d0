//! Time conversion utilities
//!
//! Pure helpers for turning provider UTC clock times into local civil time,
//! approximating the Hijri date for a Gregorian day, and formatting times for
//! display. The `Clock` abstraction lets the cache and countdown be tested
//! across midnight without waiting for one.

mod clock;
mod convert;
mod hijri;

pub use clock::{Clock, ManualClock, SystemClock};
pub use convert::{
    format_date, format_prayer_time, local_timestamp_ms, parse_date, parse_hhmm,
    parse_timezone, system_timezone, utc_to_local, TimeFormat,
};
pub use hijri::{gregorian_to_hijri, HijriDate, HijriMonth, HijriWeekday};
