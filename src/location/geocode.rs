//! Reverse and forward geocoding against Nominatim

use crate::data::provider::USER_AGENT;
use crate::data::{FetchError, LocationInfo};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

/// Default Nominatim base URL
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// Errors that can occur while geocoding
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed
    #[error("Geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// No place matched the query
    #[error("Place not found: {0}")]
    NotFound(String),

    /// The service answered with something unusable
    #[error("Invalid geocoding response: {0}")]
    Invalid(String),
}

impl From<GeocodeError> for FetchError {
    fn from(error: GeocodeError) -> Self {
        match error {
            GeocodeError::Http(e) => FetchError::from(e),
            GeocodeError::NotFound(place) => FetchError::Provider(format!("City not found: {}", place)),
            GeocodeError::Invalid(message) => FetchError::Provider(message),
        }
    }
}

/// Human-readable labels for a position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceLabels {
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Converts between coordinates and place names
#[async_trait]
pub trait Geocoder: Send + Sync + Debug {
    /// Looks up city and country labels for a position
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<PlaceLabels, GeocodeError>;

    /// Finds the coordinates of a city
    async fn search(&self, city: &str, country: &str) -> Result<LocationInfo, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: String,
    lon: String,
}

/// Nominatim client
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    http_client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new(DEFAULT_GEOCODER_URL, Duration::from_secs(10))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<PlaceLabels, GeocodeError> {
        let response = self
            .http_client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("format", "json".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("zoom", "10".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<ReverseResponse>()
            .await?;

        let address = response.address.unwrap_or_default();
        Ok(PlaceLabels {
            city: address
                .city
                .or(address.town)
                .or(address.village)
                .or(address.county),
            country: address.country,
        })
    }

    async fn search(&self, city: &str, country: &str) -> Result<LocationInfo, GeocodeError> {
        let results = self
            .http_client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("city", city),
                ("country", country),
                ("format", "json"),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<SearchResult>>()
            .await?;

        let first = results
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NotFound(format!("{}, {}", city, country)))?;

        let latitude: f64 = first
            .lat
            .parse()
            .map_err(|_| GeocodeError::Invalid(format!("bad latitude {:?}", first.lat)))?;
        let longitude: f64 = first
            .lon
            .parse()
            .map_err(|_| GeocodeError::Invalid(format!("bad longitude {:?}", first.lon)))?;

        Ok(LocationInfo {
            city: Some(city.to_string()),
            country: Some(country.to_string()),
            ..LocationInfo::new(latitude, longitude)
        })
    }
}
