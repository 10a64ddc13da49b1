//! Microphone track backed by cpal.
//!
//! Captures from the configured input device at its native sample rate,
//! downmixes every callback buffer to mono i16 and publishes it to the
//! stream's frame hub.

use super::stream::{AudioSettings, FrameHub, MediaFrame, StreamEvent, StreamEventSender, TrackKind, TrackSource};
use crate::error::CaptureError;
use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// Live microphone input. Dropping the cpal stream closes the device.
pub struct MicrophoneTrack {
    stream: Option<cpal::Stream>,
}

impl TrackSource for MicrophoneTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Microphone stream closed");
        }
    }
}

/// Opens the input device named by `device_spec` and starts publishing.
///
/// # Arguments
/// * `device_spec` - "default", a device name, or a numeric index from `list-devices`
///
/// # Errors
/// - `DeviceUnavailable` if the device does not exist or disappeared
/// - `PermissionDenied` if the platform refuses to open the stream
pub fn open_microphone(
    device_spec: &str,
    stream_id: &str,
    hub: FrameHub,
    events: StreamEventSender,
) -> Result<(MicrophoneTrack, AudioSettings), CaptureError> {
    let device = suppress_stderr(|| {
        let host = cpal::default_host();
        if device_spec == "default" {
            host.default_input_device()
                .ok_or_else(|| anyhow!("No audio input device available"))
        } else {
            find_device_by_name(&host, device_spec)
        }
    })
    .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

    let device_name = device
        .name()
        .unwrap_or_else(|_| "Unknown device".to_string());
    tracing::info!("Recording device: {}", device_name);

    let supported = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable(format!("{device_name} is not available"))
        }
        other => CaptureError::PermissionDenied(other.to_string()),
    })?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    tracing::debug!(
        "Device configuration: {}Hz, {} channels, {:?}",
        sample_rate,
        channels,
        sample_format
    );

    let error_events = events.clone();
    let error_stream_id = stream_id.to_string();
    let on_error = move |err: cpal::StreamError| {
        tracing::error!("Audio stream error: {}", err);
        if matches!(err, cpal::StreamError::DeviceNotAvailable) {
            let _ = error_events.send(StreamEvent::TrackEnded {
                stream_id: error_stream_id.clone(),
                track: TrackKind::Audio,
                reason: err.to_string(),
            });
        }
    };

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                hub.publish(MediaFrame::Audio(Arc::from(downmix(data, channels, |s| s))));
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                hub.publish(MediaFrame::Audio(Arc::from(downmix(
                    data,
                    channels,
                    f32_to_i16,
                ))));
            },
            on_error,
            None,
        ),
        other => {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{device_name} uses unsupported sample format {other:?}"
            )))
        }
    }
    .map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable(format!("{device_name} is not available"))
        }
        other => CaptureError::PermissionDenied(other.to_string()),
    })?;

    stream
        .play()
        .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;
    tracing::debug!("Audio stream started");

    Ok((
        MicrophoneTrack {
            stream: Some(stream),
        },
        AudioSettings {
            sample_rate,
            channels: 1,
        },
    ))
}

/// Averages interleaved channels into one mono channel.
fn downmix<T: Copy>(data: &[T], channels: usize, convert: impl Fn(T) -> i16) -> Vec<i16> {
    if channels <= 1 {
        return data.iter().map(|&s| convert(s)).collect();
    }
    data.chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| convert(s) as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Finds an audio input device by name or numeric index.
///
/// # Errors
/// - If no device with the specified name/index is found
pub fn find_device_by_name(host: &cpal::Host, device_spec: &str) -> anyhow::Result<cpal::Device> {
    if let Ok(index) = device_spec.parse::<usize>() {
        let devices: Vec<_> = host
            .input_devices()
            .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?
            .collect();
        let count = devices.len();

        return devices.into_iter().nth(index).ok_or_else(|| {
            anyhow!(
                "Device index {} is out of range (0-{})",
                index,
                count.saturating_sub(1)
            )
        });
    }

    let devices = host
        .input_devices()
        .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?;

    for device in devices {
        if device.name().is_ok_and(|name| name == device_spec) {
            return Ok(device);
        }
    }

    Err(anyhow!(
        "Audio input device '{device_spec}' not found. Use 'tapedeck list-devices' to see available devices."
    ))
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library warnings on Linux.
#[cfg(target_os = "linux")]
pub fn suppress_stderr<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| anyhow!("Failed to open /dev/null: {e}"))?;

    let dev_null_fd = dev_null.as_raw_fd();

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(anyhow!("Failed to duplicate stderr"));
    }

    let redirect_result = unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) };
    if redirect_result == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(anyhow!("Failed to redirect stderr"));
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

/// ALSA only exists on Linux, elsewhere this just runs `f`.
#[cfg(not(target_os = "linux"))]
pub fn suppress_stderr<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_stereo_pairs() {
        let mono = downmix(&[100i16, 300, -50, 50], 2, |s| s);
        assert_eq!(mono, vec![200, 0]);
    }

    #[test]
    fn downmix_passes_mono_through() {
        let mono = downmix(&[1i16, 2, 3], 1, |s| s);
        assert_eq!(mono, vec![1, 2, 3]);
    }

    #[test]
    fn float_samples_are_clamped() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(-1.0), -i16::MAX);
    }
}
