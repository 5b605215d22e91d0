//! Position sources

use super::LocationError;
use crate::data::provider::USER_AGENT;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt::Debug;
use std::time::Duration;

/// Default IP geolocation endpoint
pub const DEFAULT_IP_LOOKUP_URL: &str = "https://ipapi.co/json/";

/// How a position may be obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Give up on the source after this long
    pub timeout: Duration,
    /// Reuse a previous fix no older than this
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(5 * 60),
        }
    }
}

/// A raw coordinate fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Something that can tell where the user is
#[async_trait]
pub trait GeolocationSource: Send + Sync + Debug {
    async fn current_position(&self, options: &PositionOptions) -> Result<Position, LocationError>;
}

/// Always reports the configured coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticGeolocation {
    position: Position,
}

impl StaticGeolocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            position: Position {
                latitude,
                longitude,
            },
        }
    }
}

#[async_trait]
impl GeolocationSource for StaticGeolocation {
    async fn current_position(&self, _options: &PositionOptions) -> Result<Position, LocationError> {
        Ok(self.position)
    }
}

/// A source that never has a position, for hosts with no way to find one
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeolocation;

#[async_trait]
impl GeolocationSource for NoGeolocation {
    async fn current_position(&self, _options: &PositionOptions) -> Result<Position, LocationError> {
        Err(LocationError::PositionUnavailable)
    }
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Approximate position from the public IP address
#[derive(Debug, Clone)]
pub struct IpGeolocation {
    http_client: Client,
    url: String,
}

impl IpGeolocation {
    pub fn new(url: impl Into<String>) -> Self {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http_client,
            url: url.into(),
        }
    }
}

impl Default for IpGeolocation {
    fn default() -> Self {
        Self::new(DEFAULT_IP_LOOKUP_URL)
    }
}

#[async_trait]
impl GeolocationSource for IpGeolocation {
    async fn current_position(&self, options: &PositionOptions) -> Result<Position, LocationError> {
        let response = self
            .http_client
            .get(&self.url)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                return Err(LocationError::PermissionDenied)
            }
            status => {
                return Err(LocationError::Unknown(format!(
                    "IP lookup returned {}",
                    status.as_u16()
                )))
            }
        }

        let body: IpLookupResponse = response.json().await.map_err(map_request_error)?;
        match (body.latitude, body.longitude) {
            (Some(latitude), Some(longitude)) => Ok(Position {
                latitude,
                longitude,
            }),
            _ => Err(LocationError::PositionUnavailable),
        }
    }
}

fn map_request_error(error: reqwest::Error) -> LocationError {
    if error.is_timeout() {
        LocationError::Timeout
    } else if error.is_connect() {
        LocationError::PositionUnavailable
    } else {
        LocationError::Unknown(error.to_string())
    }
}
