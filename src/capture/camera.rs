//! Camera track driven by an ffmpeg capture process.
//!
//! ffmpeg opens the platform camera (v4l2 on Linux, avfoundation on macOS,
//! dshow on Windows), scales to the configured size and writes raw RGB24
//! frames to stdout. A reader thread slices stdout into frames and publishes
//! them. The camera stays open for as long as the process runs.

use super::stream::{FrameHub, MediaFrame, StreamEvent, StreamEventSender, TrackKind, TrackSource, VideoSettings};
use crate::config::VideoConfig;
use crate::error::CaptureError;
use crate::recording::ffmpeg::find_ffmpeg;
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Live camera input owned by a capture process.
pub struct CameraTrack {
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
}

impl TrackSource for CameraTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn stop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                tracing::debug!("Camera process already exited: {}", e);
            }
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        tracing::debug!("Camera capture stopped");
    }
}

/// Starts the camera and waits for its first frame.
///
/// Waiting for a frame is what turns a refused or missing camera into an
/// error here instead of a silently empty track.
///
/// # Errors
/// - `DeviceUnavailable` if ffmpeg is missing or the camera cannot be opened
/// - `PermissionDenied` if the platform refuses camera access
pub async fn open_camera(
    config: &VideoConfig,
    stream_id: &str,
    hub: FrameHub,
    events: StreamEventSender,
) -> Result<(CameraTrack, VideoSettings), CaptureError> {
    let ffmpeg = find_ffmpeg().map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
    let settings = VideoSettings {
        width: config.width,
        height: config.height,
        frame_rate: config.frame_rate,
    };

    let mut cmd = Command::new(&ffmpeg);
    cmd.arg("-loglevel").arg("error");
    cmd.args(input_args(&config.device, settings));
    cmd.arg("-f")
        .arg("rawvideo")
        .arg("-pix_fmt")
        .arg("rgb24")
        .arg("-s")
        .arg(format!("{}x{}", settings.width, settings.height))
        .arg("-r")
        .arg(settings.frame_rate.to_string())
        .arg("pipe:1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    tracing::debug!("Starting camera capture: {:?}", cmd);
    let mut child = cmd
        .spawn()
        .map_err(|e| CaptureError::DeviceUnavailable(format!("Failed to start ffmpeg: {e}")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CaptureError::DeviceUnavailable("ffmpeg stdout unavailable".to_string()))?;

    let frame_len = settings.frame_len();
    let first = tokio::task::spawn_blocking(move || {
        let mut stdout = stdout;
        let mut frame = vec![0u8; frame_len];
        stdout.read_exact(&mut frame).map(|_| (stdout, frame))
    })
    .await
    .map_err(|e| CaptureError::DeviceUnavailable(format!("Camera probe failed: {e}")))?;

    let (stdout, first_frame) = match first {
        Ok(opened) => opened,
        Err(_) => {
            let _ = child.kill();
            let _ = child.wait();
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(classify_failure(stderr.trim()));
        }
    };

    hub.publish(MediaFrame::Video(Arc::from(first_frame)));

    let stopping = Arc::new(AtomicBool::new(false));
    let reader = std::thread::spawn({
        let stopping = stopping.clone();
        let stream_id = stream_id.to_string();
        move || read_frames(stdout, frame_len, hub, stopping, stream_id, events)
    });

    tracing::info!(
        "Camera capture started: {} at {}x{}@{}",
        config.device,
        settings.width,
        settings.height,
        settings.frame_rate
    );

    Ok((
        CameraTrack {
            child: Some(child),
            reader: Some(reader),
            stopping,
        },
        settings,
    ))
}

fn read_frames(
    mut stdout: ChildStdout,
    frame_len: usize,
    hub: FrameHub,
    stopping: Arc<AtomicBool>,
    stream_id: String,
    events: StreamEventSender,
) {
    loop {
        let mut frame = vec![0u8; frame_len];
        if let Err(e) = stdout.read_exact(&mut frame) {
            if !stopping.load(Ordering::SeqCst) {
                let _ = events.send(StreamEvent::TrackEnded {
                    stream_id,
                    track: TrackKind::Video,
                    reason: format!("camera capture ended: {e}"),
                });
            }
            return;
        }
        hub.publish(MediaFrame::Video(Arc::from(frame)));
    }
}

/// Platform-specific ffmpeg input arguments for the camera.
fn input_args(device: &str, settings: VideoSettings) -> Vec<String> {
    let rate = settings.frame_rate.to_string();
    let size = format!("{}x{}", settings.width, settings.height);

    if cfg!(target_os = "macos") {
        vec![
            "-f".into(),
            "avfoundation".into(),
            "-framerate".into(),
            rate,
            "-video_size".into(),
            size,
            "-i".into(),
            format!("{device}:none"),
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            "-f".into(),
            "dshow".into(),
            "-i".into(),
            format!("video={device}"),
        ]
    } else {
        vec![
            "-f".into(),
            "v4l2".into(),
            "-framerate".into(),
            rate,
            "-video_size".into(),
            size,
            "-i".into(),
            device.to_string(),
        ]
    }
}

fn classify_failure(stderr: &str) -> CaptureError {
    let cause = if stderr.is_empty() {
        "camera produced no frames".to_string()
    } else {
        stderr.lines().last().unwrap_or(stderr).to_string()
    };

    let lowered = stderr.to_lowercase();
    if lowered.contains("permission denied") || lowered.contains("not authorized") {
        CaptureError::PermissionDenied(cause)
    } else {
        CaptureError::DeviceUnavailable(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_are_recognised() {
        let err = classify_failure("[video4linux2] /dev/video0: Permission denied");
        assert!(matches!(err, CaptureError::PermissionDenied(_)));
    }

    #[test]
    fn other_failures_mean_unavailable() {
        let err = classify_failure("/dev/video0: No such file or directory");
        assert_eq!(
            err,
            CaptureError::DeviceUnavailable("/dev/video0: No such file or directory".to_string())
        );
        assert!(matches!(
            classify_failure(""),
            CaptureError::DeviceUnavailable(_)
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_uses_v4l2() {
        let args = input_args(
            "/dev/video2",
            VideoSettings {
                width: 320,
                height: 240,
                frame_rate: 15,
            },
        );
        assert_eq!(args[1], "v4l2");
        assert_eq!(args.last().map(String::as_str), Some("/dev/video2"));
        assert!(args.contains(&"320x240".to_string()));
    }
}
