//! Configuration management for tapedeck.
//!
//! Loads and saves the TOML configuration in the user's config directory.

pub mod file;

pub use file::{get_config_path, AudioConfig, FormatsConfig, RecordingConfig, TapedeckConfig, VideoConfig};
