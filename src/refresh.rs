//! Background refresh of prayer times
//!
//! Re-fetches the current day on an interval, follows the local date across
//! midnight, and reports results to the main application over a tokio
//! channel.

use chrono::NaiveDate;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::client::{FetchOptions, FetchRequest, PrayerTimesClient};
use crate::data::PrayerTimesData;

/// Messages sent from background refresh to main app
#[derive(Debug, Clone)]
pub enum RefreshMessage {
    /// Refresh started
    RefreshStarted,
    /// New data for the current request
    Updated {
        data: PrayerTimesData,
        /// The data came from an old or previous-day cache entry
        is_stale: bool,
    },
    /// Nothing could be fetched or served from cache
    Failed(String),
    /// The local date changed; an update for the new day follows
    DateChanged(NaiveDate),
}

/// Configuration for refresh intervals
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval between regular refreshes
    pub interval: Duration,
    /// How often to check whether the local date has changed
    pub rollover_check: Duration,
    /// Move the request to the new day at local midnight
    pub follow_date: bool,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            rollover_check: Duration::from_secs(30),
            follow_date: true,
            enabled: true,
        }
    }
}

/// Handle for controlling the background refresh system
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Creates a new RefreshHandle and spawns the background refresh task
    ///
    /// # Arguments
    /// * `client` - Client used for every fetch
    /// * `request` - What to keep fresh; its date moves with the local day
    /// * `config` - Intervals and switches
    ///
    /// # Returns
    /// A RefreshHandle that receives updates via the `receiver` channel
    pub fn spawn(client: PrayerTimesClient, request: FetchRequest, config: RefreshConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            tokio::spawn(async move {
                let mut request = request;
                let mut refresh = tokio::time::interval(config.interval);
                let mut rollover = tokio::time::interval(config.rollover_check);
                // Skip the first ticks (immediate)
                refresh.tick().await;
                rollover.tick().await;

                loop {
                    tokio::select! {
                        _ = refresh.tick() => {
                            run(&client, &request, false, &msg_tx).await;
                        }
                        _ = rollover.tick(), if config.follow_date => {
                            let today = client.today();
                            if today != request.date {
                                debug!(%today, "Local date changed");
                                request = request.for_date(today);
                                let _ = msg_tx.send(RefreshMessage::DateChanged(today)).await;
                                run(&client, &request, false, &msg_tx).await;
                            }
                        }
                        Some(()) = trigger_rx.recv() => {
                            run(&client, &request, true, &msg_tx).await;
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
            });
        }

        Self {
            receiver: msg_rx,
            trigger_tx,
            shutdown_tx,
        }
    }

    /// Requests an immediate refresh that bypasses the cache
    ///
    /// A request made while one is already queued is dropped.
    pub fn request_refresh(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Shuts down the background refresh task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn run(
    client: &PrayerTimesClient,
    request: &FetchRequest,
    force_refresh: bool,
    tx: &mpsc::Sender<RefreshMessage>,
) {
    let _ = tx.send(RefreshMessage::RefreshStarted).await;

    let options = FetchOptions {
        force_refresh,
        ..FetchOptions::default()
    };
    let message = match client.fetch(request, options).await {
        Ok(Some(data)) => {
            let is_stale = client.stale(request).is_some_and(|s| s.is_stale);
            RefreshMessage::Updated { data, is_stale }
        }
        Ok(None) => RefreshMessage::Failed("No prayer times available".to_string()),
        Err(e) => RefreshMessage::Failed(e.to_string()),
    };
    let _ = tx.send(message).await;
}

/// Checks for pending refresh messages without blocking
///
/// # Arguments
/// * `handle` - The RefreshHandle to check
///
/// # Returns
/// * `Some(RefreshMessage)` if a message was available
/// * `None` if no messages are pending
pub fn try_recv(handle: &mut RefreshHandle) -> Option<RefreshMessage> {
    handle.receiver.try_recv().ok()
}
