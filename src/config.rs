//! Configuration file loading
//!
//! `config.toml` lives in the XDG config directory. Every field is optional;
//! CLI flags are layered on top by the binary.

use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::client::ClientConfig;
use crate::data::provider::DEFAULT_PROVIDER_URL;
use crate::data::{AsrSchool, CalculationMethod};
use crate::location::{DEFAULT_GEOCODER_URL, DEFAULT_IP_LOOKUP_URL};
use crate::refresh::RefreshConfig;
use crate::time::{parse_timezone, system_timezone, TimeFormat};

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown timezone: '{0}'")]
    InvalidTimezone(String),

    #[error("Unknown calculation method: {0}")]
    InvalidMethod(u8),

    #[error("Unknown Asr school: {0} (expected 0 for Standard or 1 for Hanafi)")]
    InvalidSchool(u8),
}

/// Settings read from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
    /// IANA name; the host timezone is used when unset
    pub timezone: Option<String>,
    /// Calculation method id
    pub method: u8,
    /// 0 for Standard, 1 for Hanafi
    pub school: u8,
    pub time_format: TimeFormat,
    pub provider_url: String,
    pub geocoder_url: String,
    pub ip_lookup_url: String,
    pub request_timeout_secs: u64,
    /// Cache hits older than this are refreshed in the background
    pub background_refresh_hours: u64,
    pub grace_hour: u32,
    /// Overrides the XDG cache directory
    pub cache_dir: Option<PathBuf>,
    /// Size limit for the on-disk page tier
    pub page_quota_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            city: None,
            country: None,
            timezone: None,
            method: CalculationMethod::default().id(),
            school: AsrSchool::default().id(),
            time_format: TimeFormat::default(),
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            ip_lookup_url: DEFAULT_IP_LOOKUP_URL.to_string(),
            request_timeout_secs: 15,
            background_refresh_hours: 4,
            grace_hour: 2,
            cache_dir: None,
            page_quota_bytes: 5 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Path of the config file in the XDG config directory
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "prayerclock")?;
        Some(project_dirs.config_dir().join(CONFIG_FILE))
    }

    /// Loads the default config file, or defaults when there is none
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Loads and validates a config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the fields that have a fixed set of valid values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calculation_method()?;
        self.asr_school()?;
        self.tz()?;
        Ok(())
    }

    pub fn calculation_method(&self) -> Result<CalculationMethod, ConfigError> {
        CalculationMethod::from_id(self.method).ok_or(ConfigError::InvalidMethod(self.method))
    }

    pub fn asr_school(&self) -> Result<AsrSchool, ConfigError> {
        AsrSchool::try_from(self.school).map_err(|_| ConfigError::InvalidSchool(self.school))
    }

    /// Configured timezone, else the host's, else UTC
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        match &self.timezone {
            Some(name) => {
                parse_timezone(name).ok_or_else(|| ConfigError::InvalidTimezone(name.clone()))
            }
            None => Ok(system_timezone().unwrap_or(Tz::UTC)),
        }
    }

    /// Configured coordinates, when both are set
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Directory for cache files and the log
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir.clone().or_else(|| {
            ProjectDirs::from("", "", "prayerclock").map(|dirs| dirs.cache_dir().to_path_buf())
        })
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            grace_hour: self.grace_hour,
            ..CacheConfig::default()
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            background_refresh_after: Duration::from_secs(self.background_refresh_hours * 60 * 60),
            ..ClientConfig::default()
        }
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig::default()
    }
}
