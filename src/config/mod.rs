//! Configuration management for pingboard.
//!
//! Provides XDG-compliant settings storage. Command-line flags and
//! `PINGBOARD_*` environment variables override values from the file.

mod settings;

pub use settings::{AppSettings, Paths};
