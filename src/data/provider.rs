//! Upstream prayer-time provider
//!
//! Retrieves one day of prayer times from an UmmahAPI-compatible endpoint.
//! Times in the response are UTC `HH:MM` strings; conversion to local civil
//! time happens in [`super::transform`].

use super::{AsrSchool, CalculationMethod};
use crate::time::format_date;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default UmmahAPI prayer-times endpoint
pub const DEFAULT_PROVIDER_URL: &str = "https://www.ummahapi.com/api/prayer-times";

/// User agent sent with every outbound request
pub(crate) const USER_AGENT: &str = concat!("prayerclock/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur when retrieving prayer times
///
/// `Clone` so a single failure can be handed to every caller waiting on the
/// same coalesced request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The provider did not answer within the request timeout
    #[error("Prayer times request timed out")]
    Timeout,

    /// The provider could not be reached
    #[error("Unable to reach prayer times service: {0}")]
    Unreachable(String),

    /// The provider answered with an error or an unusable body
    #[error("Prayer times service error: {0}")]
    Provider(String),

    /// The caller cancelled the request
    #[error("Prayer times request was cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if error.is_connect() || error.is_request() {
            FetchError::Unreachable(error.to_string())
        } else {
            FetchError::Provider(error.to_string())
        }
    }
}

/// Parameters for a single provider call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub method: CalculationMethod,
    pub school: AsrSchool,
    pub date: NaiveDate,
}

/// Raw provider response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UmmahResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<UmmahData>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Provider payload for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UmmahData {
    /// `YYYY-MM-DD`
    pub date: String,
    pub location: UmmahLocation,
    #[serde(default)]
    pub calculation_method: Option<String>,
    #[serde(default)]
    pub madhab: Option<String>,
    pub prayer_times: UmmahPrayerTimes,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UmmahLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Prayer times as UTC `HH:MM` strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UmmahPrayerTimes {
    #[serde(default)]
    pub fajr: String,
    #[serde(default)]
    pub sunrise: String,
    #[serde(default)]
    pub dhuhr: String,
    #[serde(default)]
    pub asr: String,
    #[serde(default)]
    pub maghrib: String,
    #[serde(default)]
    pub isha: String,
}

/// Source of raw prayer times
#[async_trait]
pub trait PrayerTimesProvider: Send + Sync + Debug {
    /// Retrieves the provider response for one day
    async fn fetch(&self, query: &ProviderQuery) -> Result<UmmahResponse, FetchError>;
}

/// reqwest-backed provider for UmmahAPI-compatible endpoints
#[derive(Debug, Clone)]
pub struct HttpProvider {
    http_client: Client,
    base_url: String,
}

impl HttpProvider {
    /// Creates a provider for `base_url` with the given request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http_client,
            base_url: base_url.into(),
        }
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn query_params(query: &ProviderQuery) -> [(&'static str, String); 5] {
        [
            ("lat", query.latitude.to_string()),
            ("lng", query.longitude.to_string()),
            ("method", query.method.provider_token().to_string()),
            ("madhab", query.school.provider_token().to_string()),
            ("date", format_date(query.date)),
        ]
    }
}

impl Default for HttpProvider {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDER_URL, Duration::from_secs(15))
    }
}

#[async_trait]
impl PrayerTimesProvider for HttpProvider {
    async fn fetch(&self, query: &ProviderQuery) -> Result<UmmahResponse, FetchError> {
        debug!(
            latitude = query.latitude,
            longitude = query.longitude,
            method = query.method.id(),
            date = %query.date,
            "Requesting prayer times"
        );

        let response = self
            .http_client
            .get(&self.base_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&Self::query_params(query))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Provider(status_message(status)));
        }

        response
            .json::<UmmahResponse>()
            .await
            .map_err(|e| FetchError::Provider(format!("Invalid response body: {}", e)))
    }
}

fn status_message(status: StatusCode) -> String {
    format!(
        "API error: {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}
