//! Command-line interface parsing for prayerclock
//!
//! This module handles parsing of CLI arguments using clap and layering them
//! over the values loaded from `config.toml`.

use chrono::NaiveDate;
use clap::Parser;
use thiserror::Error;

use crate::config::Config;
use crate::data::{AsrSchool, CalculationMethod};
use crate::time::{parse_date, parse_timezone, TimeFormat};

/// Error types for CLI argument parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    /// The method is neither a known id nor a known name
    #[error("Invalid method: '{0}'. Use a method id such as 2 (ISNA) or 4 (Umm Al-Qura)")]
    InvalidMethod(String),

    #[error("Invalid school: '{0}'. Valid schools: standard, hanafi")]
    InvalidSchool(String),

    #[error("Invalid format: '{0}'. Valid formats: 12h, 24h")]
    InvalidFormat(String),

    #[error("Invalid timezone: '{0}'. Use an IANA name such as America/New_York")]
    InvalidTimezone(String),

    #[error("Invalid date: '{0}'. Expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Only one of --lat and --lon was given
    #[error("--lat and --lon must be given together")]
    IncompleteCoordinates,
}

/// prayerclock - Prayer times and countdown in the terminal
#[derive(Parser, Debug)]
#[command(name = "prayerclock")]
#[command(about = "Daily prayer times with a live countdown to the next prayer")]
#[command(version)]
pub struct Cli {
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// City to look up instead of coordinates
    #[arg(long)]
    pub city: Option<String>,

    /// Country for --city
    #[arg(long)]
    pub country: Option<String>,

    /// Calculation method id (e.g. 2 for ISNA)
    #[arg(long, value_name = "ID")]
    pub method: Option<String>,

    /// Asr school: standard or hanafi
    #[arg(long)]
    pub school: Option<String>,

    /// IANA timezone, e.g. America/New_York
    #[arg(long)]
    pub timezone: Option<String>,

    /// Day to show, YYYY-MM-DD (defaults to today)
    #[arg(long)]
    pub date: Option<String>,

    /// Clock style: 12h or 24h
    #[arg(long)]
    pub format: Option<String>,

    /// Print the day's times and exit
    #[arg(long)]
    pub once: bool,

    /// Empty the cache before starting
    #[arg(long)]
    pub clear_cache: bool,

    /// Print cache statistics on exit
    #[arg(long)]
    pub stats: bool,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartupConfig {
    /// File configuration with CLI overrides applied
    pub config: Config,
    /// Fixed day; `None` follows the local date
    pub date: Option<NaiveDate>,
    pub once: bool,
    pub clear_cache: bool,
    pub stats: bool,
}

/// Parses a calculation method given as an id
pub fn parse_method_arg(s: &str) -> Result<CalculationMethod, CliError> {
    s.trim()
        .parse::<u8>()
        .ok()
        .and_then(CalculationMethod::from_id)
        .ok_or_else(|| CliError::InvalidMethod(s.to_string()))
}

/// Parses an Asr school by name or id
pub fn parse_school_arg(s: &str) -> Result<AsrSchool, CliError> {
    match s.trim().to_lowercase().as_str() {
        "standard" | "shafi" | "0" => Ok(AsrSchool::Standard),
        "hanafi" | "1" => Ok(AsrSchool::Hanafi),
        _ => Err(CliError::InvalidSchool(s.to_string())),
    }
}

pub fn parse_format_arg(s: &str) -> Result<TimeFormat, CliError> {
    s.parse().map_err(|_| CliError::InvalidFormat(s.to_string()))
}

pub fn parse_date_arg(s: &str) -> Result<NaiveDate, CliError> {
    parse_date(s).ok_or_else(|| CliError::InvalidDate(s.to_string()))
}

impl StartupConfig {
    /// Applies parsed CLI arguments over a loaded configuration.
    ///
    /// # Arguments
    /// * `cli` - The parsed CLI struct
    /// * `config` - Configuration loaded from file (or defaults)
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with overrides applied
    /// * `Err(CliError)` if any argument value is invalid
    pub fn from_cli(cli: &Cli, config: Config) -> Result<Self, CliError> {
        let mut config = config;

        match (cli.lat, cli.lon) {
            (Some(lat), Some(lon)) => {
                config.latitude = Some(lat);
                config.longitude = Some(lon);
            }
            (None, None) => {}
            _ => return Err(CliError::IncompleteCoordinates),
        }
        if let Some(city) = &cli.city {
            config.city = Some(city.clone());
        }
        if let Some(country) = &cli.country {
            config.country = Some(country.clone());
        }
        if let Some(method) = &cli.method {
            config.method = parse_method_arg(method)?.id();
        }
        if let Some(school) = &cli.school {
            config.school = parse_school_arg(school)?.id();
        }
        if let Some(timezone) = &cli.timezone {
            parse_timezone(timezone).ok_or_else(|| CliError::InvalidTimezone(timezone.clone()))?;
            config.timezone = Some(timezone.clone());
        }
        if let Some(format) = &cli.format {
            config.time_format = parse_format_arg(format)?;
        }
        let date = cli.date.as_deref().map(parse_date_arg).transpose()?;

        Ok(StartupConfig {
            config,
            date,
            once: cli.once,
            clear_cache: cli.clear_cache,
            stats: cli.stats,
        })
    }
}
