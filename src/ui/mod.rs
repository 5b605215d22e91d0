//! UI rendering module for prayerclock
//!
//! This module contains all the rendering logic for the terminal user interface,
//! using the ratatui library for TUI components.

pub mod help_overlay;
pub mod prayer_view;

pub use help_overlay::render as render_help_overlay;
pub use prayer_view::render;
