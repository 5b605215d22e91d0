//! Application state management for prayerclock
//!
//! This module contains the main application state, handling keyboard input,
//! data loading, and the messages arriving from background refresh.

use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent};

use crate::client::{FetchOptions, FetchRequest, PrayerTimesClient};
use crate::countdown::CountdownState;
use crate::data::PrayerTimesData;
use crate::refresh::RefreshMessage;
use crate::time::TimeFormat;

/// Application state enum representing the current view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppState {
    /// Initial loading state while fetching data
    Loading,
    /// Prayer times are available
    Ready,
    /// Nothing could be loaded; holds the reason
    Error(String),
}

/// Main application struct managing state and data
#[derive(Debug)]
pub struct App {
    /// Current application state/view
    pub state: AppState,
    /// Prayer times being shown
    pub data: Option<PrayerTimesData>,
    /// Latest countdown tick
    pub countdown: Option<CountdownState>,
    /// Clock style for prayer times
    pub time_format: TimeFormat,
    /// Shown data came from an old or previous-day cache entry
    pub is_stale: bool,
    /// A background refresh is running
    pub refreshing: bool,
    /// Last refresh failure, cleared by the next update
    pub last_error: Option<String>,
    /// Flag indicating the application should quit
    pub should_quit: bool,
    /// Flag indicating a refresh has been requested
    pub refresh_requested: bool,
    /// Flag to show help overlay
    pub show_help: bool,
    /// Timestamp of last data refresh
    pub last_refresh: Option<DateTime<Local>>,
}

impl App {
    /// Creates a new App instance in the loading state
    pub fn new(time_format: TimeFormat) -> Self {
        Self {
            state: AppState::Loading,
            data: None,
            countdown: None,
            time_format,
            is_stale: false,
            refreshing: false,
            last_error: None,
            should_quit: false,
            refresh_requested: false,
            show_help: false,
            last_refresh: None,
        }
    }

    /// Shows whatever the synchronous cache tiers hold, before any network
    pub fn show_cached(&mut self, client: &PrayerTimesClient, request: &FetchRequest) {
        if let Some(stale) = client.stale(request) {
            self.is_stale = stale.is_stale;
            self.set_data(stale.data);
        }
    }

    /// Loads the day's prayer times
    ///
    /// Already-shown cached data is kept when the fetch fails.
    pub async fn load(&mut self, client: &PrayerTimesClient, request: &FetchRequest) {
        match client.fetch(request, FetchOptions::default()).await {
            Ok(Some(data)) => {
                self.is_stale = client.stale(request).is_some_and(|s| s.is_stale);
                self.last_error = None;
                self.set_data(data);
            }
            Ok(None) => self.fail("No prayer times available".to_string()),
            Err(e) => self.fail(e.to_string()),
        }
    }

    /// Applies a message from the background refresh task
    pub fn apply_refresh(&mut self, message: RefreshMessage) {
        match message {
            RefreshMessage::RefreshStarted => self.refreshing = true,
            RefreshMessage::Updated { data, is_stale } => {
                self.refreshing = false;
                self.is_stale = is_stale;
                self.last_error = None;
                self.set_data(data);
            }
            RefreshMessage::Failed(reason) => {
                self.refreshing = false;
                self.fail(reason);
            }
            RefreshMessage::DateChanged(_) => self.countdown = None,
        }
    }

    /// Records the latest countdown state
    pub fn set_countdown(&mut self, countdown: Option<CountdownState>) {
        self.countdown = countdown;
    }

    /// Handles keyboard input
    pub fn handle_key(&mut self, key_event: KeyEvent) {
        // Handle help overlay - intercepts all keys when shown
        if self.show_help {
            match key_event.code {
                KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q') => {
                    self.show_help = false;
                }
                _ => {} // Ignore other keys when help is shown
            }
            return;
        }

        match key_event.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char('r') => {
                self.refresh_requested = true;
            }
            KeyCode::Char('t') => {
                self.time_format = self.time_format.toggled();
            }
            KeyCode::Char('?') => {
                self.show_help = true;
            }
            _ => {}
        }
    }

    /// Takes the pending refresh request, if any
    pub fn take_refresh_request(&mut self) -> bool {
        std::mem::take(&mut self.refresh_requested)
    }

    fn set_data(&mut self, data: PrayerTimesData) {
        self.data = Some(data);
        self.state = AppState::Ready;
        self.last_refresh = Some(Local::now());
    }

    fn fail(&mut self, reason: String) {
        if self.data.is_none() {
            self.state = AppState::Error(reason.clone());
        }
        self.last_error = Some(reason);
    }
}
