//! Configuration file management for tapedeck.
//!
//! This module handles loading and saving application configuration from TOML files.
//! Configuration is stored in the user's config directory and created from the
//! embedded template on first run.

use crate::capture::MediaKind;
use crate::recording::format::MediaFormat;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Embedded default configuration template.
const DEFAULT_CONFIG: &str = include_str!("../../environments/tapedeck.toml");

/// Current application version from Cargo.toml
const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Microphone and level meter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `tapedeck list-devices`
    /// - device name from `tapedeck list-devices`
    #[serde(default = "default_audio_device")]
    pub device: String,
    /// Reference level in dBFS for 100% meter display
    #[serde(default = "default_reference_level_db")]
    pub reference_level_db: i8,
}

/// Camera configuration, passed to the ffmpeg capture process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_video_device")]
    pub device: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

/// Recorder behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Encoder chunk cadence in milliseconds
    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,
    /// Mode selected at startup
    #[serde(default)]
    pub default_mode: MediaKind,
    /// Export directory; the Downloads folder when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// Recording format preferences per kind, best first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatsConfig {
    #[serde(default = "default_audio_formats")]
    pub audio: Vec<String>,
    #[serde(default = "default_video_formats")]
    pub video: Vec<String>,
}

fn default_audio_device() -> String {
    "default".to_string()
}

fn default_reference_level_db() -> i8 {
    -20
}

fn default_video_device() -> String {
    if cfg!(target_os = "macos") {
        "0".to_string()
    } else {
        "/dev/video0".to_string()
    }
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_frame_rate() -> u32 {
    30
}

fn default_timeslice_ms() -> u64 {
    1000
}

fn default_audio_formats() -> Vec<String> {
    vec![
        "audio/webm;codecs=opus".to_string(),
        "audio/ogg;codecs=opus".to_string(),
        "audio/wav".to_string(),
    ]
}

fn default_video_formats() -> Vec<String> {
    vec![
        "video/webm;codecs=vp9".to_string(),
        "video/webm".to_string(),
        "video/mp4".to_string(),
    ]
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_audio_device(),
            reference_level_db: default_reference_level_db(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            device: default_video_device(),
            width: default_width(),
            height: default_height(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            timeslice_ms: default_timeslice_ms(),
            default_mode: MediaKind::default(),
            output_dir: None,
        }
    }
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            audio: default_audio_formats(),
            video: default_video_formats(),
        }
    }
}

impl FormatsConfig {
    /// Parsed preference list for one kind.
    ///
    /// # Errors
    /// - If an entry is not a valid media type for that kind
    pub fn preferences(&self, kind: MediaKind) -> anyhow::Result<Vec<MediaFormat>> {
        let entries = match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        };

        entries
            .iter()
            .map(|entry| {
                let format = MediaFormat::parse(entry)
                    .ok_or_else(|| anyhow!("Invalid {kind} format '{entry}'"))?;
                if format.kind() != kind {
                    return Err(anyhow!(
                        "Format '{entry}' listed under {kind} is not a {kind} type"
                    ));
                }
                Ok(format)
            })
            .collect()
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TapedeckConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_version: Option<String>,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub formats: FormatsConfig,
}

impl TapedeckConfig {
    /// Loads configuration from the user's config directory, creating it on first run.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If the config file cannot be read or created
    /// - If the TOML is malformed or fails validation
    pub fn load() -> anyhow::Result<Self> {
        let config_path = get_config_path()?;
        ensure_config_file(&config_path)?;
        Self::load_from(&config_path)
    }

    /// Loads and validates configuration from an explicit path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: TapedeckConfig = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;

        if config.config_version.as_deref() != Some(CURRENT_VERSION) {
            tracing::debug!(
                "Config version {:?} differs from app version {}",
                config.config_version,
                CURRENT_VERSION
            );
        }

        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Saves configuration to the user's config directory.
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = get_config_path()?;
        let config_content = toml::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        tracing::info!("Configuration saved");
        Ok(())
    }

    /// Validates values that serde cannot check on its own.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recording.timeslice_ms == 0 {
            return Err(anyhow!("recording.timeslice_ms must be greater than zero"));
        }
        if self.video.width == 0 || self.video.height == 0 || self.video.frame_rate == 0 {
            return Err(anyhow!("video width, height and frame_rate must be non-zero"));
        }
        for kind in [MediaKind::Audio, MediaKind::Video] {
            if self.formats.preferences(kind)?.is_empty() {
                return Err(anyhow!("formats.{kind} must list at least one format"));
            }
        }
        Ok(())
    }

    /// Directory exported recordings are written to.
    pub fn output_dir(&self) -> PathBuf {
        self.recording
            .output_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Retrieves the path to the config file.
///
/// # Errors
/// - If the home directory cannot be determined
pub fn get_config_path() -> anyhow::Result<PathBuf> {
    let config_dir = dirs::home_dir()
        .ok_or_else(|| anyhow!("Could not determine home directory"))?
        .join(".config")
        .join("tapedeck");

    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    Ok(config_dir.join("tapedeck.toml"))
}

/// Writes the default template, stamped with the app version, if no config exists.
///
/// Returns whether a new file was written.
pub fn ensure_config_file(config_path: &Path) -> anyhow::Result<bool> {
    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let full_config = format!(r#"config_version = "{CURRENT_VERSION}""#) + "\n" + DEFAULT_CONFIG;
    fs::write(config_path, full_config)
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    tracing::info!("Created default config at {}", config_path.display());
    Ok(true)
}
