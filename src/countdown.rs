//! Current/next prayer countdown
//!
//! [`current_and_next`] is a pure function of the day's prayers and an
//! instant. [`CountdownEngine`] holds the inputs and the start/stop and
//! visibility switches, and [`CountdownHandle`] runs it on a one-second tick,
//! publishing each state on a watch channel.

use crate::data::{PrayerName, PrayerTime};
use crate::time::{local_timestamp_ms, Clock};
use chrono::{DateTime, Days};
use chrono_tz::Tz;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Hours, minutes and seconds of a countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountdownParts {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl fmt::Display for CountdownParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Splits a duration in milliseconds into whole hours, minutes and seconds
///
/// Negative durations count as zero.
pub fn format_countdown(ms: i64) -> CountdownParts {
    let total_seconds = (ms.max(0) / 1000) as u64;
    CountdownParts {
        hours: total_seconds / 3600,
        minutes: (total_seconds % 3600) / 60,
        seconds: total_seconds % 60,
    }
}

/// Where "now" falls in the day's prayers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownState {
    pub current: PrayerName,
    pub next: PrayerName,
    /// Epoch milliseconds of the next prayer
    pub next_time_ms: i64,
    /// Never negative
    pub remaining_ms: i64,
    pub formatted: CountdownParts,
}

/// Finds the current and next prayer at `now_ms`
///
/// Sunrise is not a prayer and is skipped. Before Fajr the current prayer is
/// the previous night's Isha; after Isha the next prayer is tomorrow's Fajr,
/// taken as today's Fajr time on the following local day.
///
/// Returns `None` when `prayers` holds no prayer boundaries.
pub fn current_and_next(prayers: &[PrayerTime], now_ms: i64, tz: Tz) -> Option<CountdownState> {
    let mut boundaries: Vec<&PrayerTime> = prayers.iter().filter(|p| p.key.is_prayer()).collect();
    boundaries.sort_by_key(|p| p.timestamp);

    let first = *boundaries.first()?;
    let last = *boundaries.last()?;

    let (current, next, next_time_ms) = match boundaries.iter().rposition(|p| p.timestamp <= now_ms)
    {
        None => (last.key, first.key, first.timestamp),
        Some(i) if i + 1 < boundaries.len() => {
            let next = boundaries[i + 1];
            (boundaries[i].key, next.key, next.timestamp)
        }
        Some(_) => (last.key, first.key, next_day_timestamp(first.timestamp, tz)),
    };

    let remaining_ms = (next_time_ms - now_ms).max(0);
    Some(CountdownState {
        current,
        next,
        next_time_ms,
        remaining_ms,
        formatted: format_countdown(remaining_ms),
    })
}

/// Same local wall-clock time one calendar day later
fn next_day_timestamp(timestamp_ms: i64, tz: Tz) -> i64 {
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    let Some(instant) = DateTime::from_timestamp_millis(timestamp_ms) else {
        return timestamp_ms + DAY_MS;
    };
    let local = instant.with_timezone(&tz);
    match local.date_naive().checked_add_days(Days::new(1)) {
        Some(tomorrow) => local_timestamp_ms(tomorrow, local.time(), tz),
        None => timestamp_ms + DAY_MS,
    }
}

/// Countdown inputs plus the switches that decide whether it ticks
#[derive(Debug)]
pub struct CountdownEngine {
    clock: Arc<dyn Clock>,
    tz: Tz,
    prayers: Vec<PrayerTime>,
    running: bool,
    visible: bool,
}

impl CountdownEngine {
    /// Creates a stopped, visible engine with no prayers
    pub fn new(clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self {
            clock,
            tz,
            prayers: Vec::new(),
            running: false,
            visible: true,
        }
    }

    pub fn set_prayers(&mut self, prayers: Vec<PrayerTime>) {
        self.prayers = prayers;
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Pauses ticking while hidden without forgetting that it was started
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Whether ticks should currently be produced
    pub fn is_active(&self) -> bool {
        self.running && self.visible
    }

    /// Computes the state for the clock's current instant
    pub fn tick(&self) -> Option<CountdownState> {
        current_and_next(&self.prayers, self.clock.now_ms(), self.tz)
    }
}

#[derive(Debug)]
enum Control {
    Start,
    Stop,
    Visible(bool),
    Prayers(Vec<PrayerTime>),
    Shutdown,
}

/// Runs a [`CountdownEngine`] on a background task
///
/// The task ticks once per second while the engine is started and visible.
#[derive(Debug)]
pub struct CountdownHandle {
    control_tx: mpsc::UnboundedSender<Control>,
    state_rx: watch::Receiver<Option<CountdownState>>,
}

impl CountdownHandle {
    /// Spawns the tick loop for `engine`
    pub fn spawn(engine: CountdownEngine) -> Self {
        Self::spawn_with_period(engine, Duration::from_secs(1))
    }

    fn spawn_with_period(mut engine: CountdownEngine, period: Duration) -> Self {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(None);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick(), if engine.is_active() => {
                        state_tx.send_replace(engine.tick());
                    }
                    control = control_rx.recv() => {
                        match control {
                            Some(Control::Start) => engine.start(),
                            Some(Control::Stop) => engine.stop(),
                            Some(Control::Visible(visible)) => engine.set_visible(visible),
                            Some(Control::Prayers(prayers)) => engine.set_prayers(prayers),
                            Some(Control::Shutdown) | None => break,
                        }
                        if engine.is_active() {
                            state_tx.send_replace(engine.tick());
                        }
                    }
                }
            }
        });

        Self {
            control_tx,
            state_rx,
        }
    }

    pub fn start(&self) {
        let _ = self.control_tx.send(Control::Start);
    }

    pub fn stop(&self) {
        let _ = self.control_tx.send(Control::Stop);
    }

    /// Pauses or resumes ticking when the display is hidden or shown
    pub fn set_visible(&self, visible: bool) {
        let _ = self.control_tx.send(Control::Visible(visible));
    }

    pub fn set_prayers(&self, prayers: Vec<PrayerTime>) {
        let _ = self.control_tx.send(Control::Prayers(prayers));
    }

    /// Most recently published state
    pub fn state(&self) -> Option<CountdownState> {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified on every published state
    pub fn subscribe(&self) -> watch::Receiver<Option<CountdownState>> {
        self.state_rx.clone()
    }

    /// Stops the tick loop
    pub fn shutdown(&self) {
        let _ = self.control_tx.send(Control::Shutdown);
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    fn tz() -> Tz {
        "America/New_York".parse().unwrap()
    }

    fn local_ms(day: u32, h: u32, m: u32, s: u32) -> i64 {
        let date = NaiveDate::from_ymd_opt(2025, 6, day).unwrap();
        local_timestamp_ms(date, NaiveTime::from_hms_opt(h, m, s).unwrap(), tz())
    }

    /// 05:00, 06:10, 13:00, 16:30, 18:45, 20:00 local on 2025-06-01
    fn prayers() -> Vec<PrayerTime> {
        let times = [(5, 0), (6, 10), (13, 0), (16, 30), (18, 45), (20, 0)];
        PrayerName::ALL
            .iter()
            .zip(times)
            .map(|(key, (h, m))| PrayerTime {
                key: *key,
                name: key.display_name().to_string(),
                name_arabic: key.arabic_name().to_string(),
                time: format!("{:02}:{:02}", h, m),
                timestamp: local_ms(1, h, m, 0),
            })
            .collect()
    }

    #[test]
    fn test_one_second_before_isha() {
        let state = current_and_next(&prayers(), local_ms(1, 19, 59, 59), tz()).unwrap();
        assert_eq!(state.current, PrayerName::Maghrib);
        assert_eq!(state.next, PrayerName::Isha);
        assert_eq!(state.remaining_ms, 1000);
        assert_eq!(state.formatted.to_string(), "00:00:01");
    }

    #[test]
    fn test_just_after_isha_counts_to_tomorrow_fajr() {
        let state = current_and_next(&prayers(), local_ms(1, 20, 0, 1), tz()).unwrap();
        assert_eq!(state.current, PrayerName::Isha);
        assert_eq!(state.next, PrayerName::Fajr);
        assert_eq!(state.next_time_ms, local_ms(2, 5, 0, 0));
        assert_eq!(state.remaining_ms, 32_399_000);
        assert_eq!(state.formatted.to_string(), "08:59:59");
    }

    #[test]
    fn test_before_fajr_is_still_isha() {
        let state = current_and_next(&prayers(), local_ms(1, 3, 0, 0), tz()).unwrap();
        assert_eq!(state.current, PrayerName::Isha);
        assert_eq!(state.next, PrayerName::Fajr);
        assert_eq!(state.remaining_ms, 2 * 3_600_000);
    }

    #[test]
    fn test_sunrise_is_not_a_boundary() {
        let state = current_and_next(&prayers(), local_ms(1, 7, 0, 0), tz()).unwrap();
        assert_eq!(state.current, PrayerName::Fajr);
        assert_eq!(state.next, PrayerName::Dhuhr);
    }

    #[test]
    fn test_exactly_at_boundary_switches_current() {
        let state = current_and_next(&prayers(), local_ms(1, 13, 0, 0), tz()).unwrap();
        assert_eq!(state.current, PrayerName::Dhuhr);
        assert_eq!(state.next, PrayerName::Asr);
    }

    #[test]
    fn test_empty_prayers() {
        assert!(current_and_next(&[], 0, tz()).is_none());
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(3_723_000).to_string(), "01:02:03");
        assert_eq!(format_countdown(999).to_string(), "00:00:00");
        assert_eq!(format_countdown(-5_000), CountdownParts::default());
        assert_eq!(format_countdown(100 * 3_600_000).hours, 100);
    }

    #[test]
    fn test_next_day_across_dst_change() {
        // New York springs forward on 2025-03-09; 05:00 local stays 05:00
        let tz = tz();
        let date = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();
        let time = NaiveTime::from_hms_opt(5, 0, 0).unwrap();
        let today = local_timestamp_ms(date, time, tz);
        let tomorrow = next_day_timestamp(today, tz);
        assert_eq!(tomorrow - today, 23 * 3_600_000);
    }

    #[test]
    fn test_engine_switches() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()));
        let mut engine = CountdownEngine::new(clock, tz());
        assert!(!engine.is_active());
        assert!(engine.tick().is_none());

        engine.set_prayers(prayers());
        engine.start();
        assert!(engine.is_active());
        engine.set_visible(false);
        assert!(!engine.is_active());
        engine.set_visible(true);
        engine.stop();
        assert!(!engine.is_active());

        // 12:00 UTC is 08:00 in New York
        let state = engine.tick().unwrap();
        assert_eq!(state.current, PrayerName::Fajr);
        assert_eq!(state.next, PrayerName::Dhuhr);
    }

    #[tokio::test]
    async fn test_handle_publishes_only_while_active() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 59).unwrap(),
        ));
        let engine = CountdownEngine::new(clock.clone(), tz());
        let handle = CountdownHandle::spawn_with_period(engine, Duration::from_millis(10));
        let mut updates = handle.subscribe();

        handle.set_prayers(prayers());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.state().is_none(), "stopped engine publishes nothing");

        handle.start();
        updates.changed().await.unwrap();
        let state = handle.state().unwrap();
        assert_eq!(state.current, PrayerName::Maghrib);
        assert_eq!(state.next, PrayerName::Isha);
        assert_eq!(state.remaining_ms, 1000);

        handle.set_visible(false);
        tokio::time::sleep(Duration::from_millis(30)).await;
        clock.advance(chrono::Duration::seconds(2));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state().unwrap().remaining_ms, 1000, "hidden engine is paused");

        handle.set_visible(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = handle.state().unwrap();
        assert_eq!(state.current, PrayerName::Isha);
        assert_eq!(state.next, PrayerName::Fajr);

        handle.shutdown();
    }
}
