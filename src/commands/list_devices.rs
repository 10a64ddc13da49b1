//! Lists capture devices and the recording formats this machine can produce.

use crate::capture::microphone::suppress_stderr;
use crate::capture::{MediaKind, TrackKind};
use crate::config::TapedeckConfig;
use crate::recording::format::FormatSupport;
use crate::recording::PlatformEncoders;
use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait};

/// Prints audio input devices, the configured camera and format support.
///
/// # Errors
/// - If the audio host cannot enumerate devices
pub fn handle_list_devices() -> anyhow::Result<()> {
    let (host, devices) = suppress_stderr(|| {
        let host = cpal::default_host();
        let devices: Vec<cpal::Device> = host
            .input_devices()
            .map_err(|e| anyhow!("Failed to enumerate audio devices: {e}"))?
            .filter(|d| d.name().is_ok())
            .collect();
        Ok((host, devices))
    })?;

    println!();
    if devices.is_empty() {
        println!("No audio input devices found on this system.");
    } else {
        println!("Audio input devices:");
        println!();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        for (index, device) in devices.iter().enumerate() {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let marker = if default_name.as_deref() == Some(name.as_str()) {
                " [DEFAULT]"
            } else {
                ""
            };
            let config = match device.default_input_config() {
                Ok(config) => format!(
                    "{}Hz, {} channel(s)",
                    config.sample_rate().0,
                    config.channels()
                ),
                Err(_) => "configuration unavailable".to_string(),
            };
            println!("  {index}: {name}{marker}");
            println!("     {config}");
        }
    }

    // The camera is opened through ffmpeg, so only the configured one is shown
    let config = TapedeckConfig::load().ok();
    if let Some(config) = &config {
        println!();
        println!(
            "Camera: {} ({}x{} @ {} fps)",
            config.video.device, config.video.width, config.video.height, config.video.frame_rate
        );
    }

    let encoders = PlatformEncoders::detect();
    println!();
    match encoders.ffmpeg() {
        Some(path) => println!("ffmpeg: {}", path.display()),
        None => println!("ffmpeg: not found (audio is recorded as WAV, video is unavailable)"),
    }

    if let Some(config) = &config {
        for kind in [MediaKind::Audio, MediaKind::Video] {
            let tracks: &[TrackKind] = match kind {
                MediaKind::Audio => &[TrackKind::Audio],
                MediaKind::Video => &[TrackKind::Audio, TrackKind::Video],
            };
            println!();
            println!("{kind} formats, in preference order:");
            for format in config.formats.preferences(kind)? {
                let status = if encoders.is_supported(&format, tracks) {
                    "supported"
                } else {
                    "unavailable"
                };
                println!("  {:<32} {status}", format.to_string());
            }
        }
    }
    println!();

    Ok(())
}
