//! prayerclock library
//!
//! Prayer-time acquisition, tiered caching and the live countdown, plus the
//! CLI, app state and UI modules used by the binary and integration tests.

pub mod app;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod countdown;
pub mod data;
pub mod location;
pub mod refresh;
pub mod services;
pub mod time;
pub mod ui;

#[cfg(test)]
mod testing;
