//! Synthetic capture host.
//!
//! Generates a steady sine tone and a scrolling colour-bar picture instead
//! of touching real devices. Used by the test suite and by `--synthetic` for
//! trying the recorder on machines without a microphone or camera.

use super::stream::{
    AudioSettings, Constraints, FrameHub, LiveStream, MediaDevices, MediaFrame, StreamEventSender,
    TrackKind, TrackSource, VideoSettings,
};
use crate::error::CaptureError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Audio is published in 20 ms blocks.
const AUDIO_BLOCK: Duration = Duration::from_millis(20);
const TONE_HZ: f32 = 440.0;

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Capture host that fabricates its input.
#[derive(Debug, Clone)]
pub struct SyntheticDevices {
    deny: Option<String>,
    audio: AudioSettings,
    video: VideoSettings,
}

impl SyntheticDevices {
    pub fn new() -> Self {
        Self {
            deny: None,
            audio: AudioSettings {
                sample_rate: 16000,
                channels: 1,
            },
            video: VideoSettings {
                width: 64,
                height: 48,
                frame_rate: 10,
            },
        }
    }

    /// A host that refuses every request with `PermissionDenied(cause)`.
    pub fn denying(cause: impl Into<String>) -> Self {
        Self {
            deny: Some(cause.into()),
            ..Self::new()
        }
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl MediaDevices for SyntheticDevices {
    async fn get_user_media(
        &self,
        constraints: Constraints,
        _events: StreamEventSender,
    ) -> Result<LiveStream, CaptureError> {
        if let Some(cause) = &self.deny {
            return Err(CaptureError::PermissionDenied(cause.clone()));
        }
        if !constraints.audio && !constraints.video {
            return Err(CaptureError::DeviceUnavailable(
                "no tracks were requested".to_string(),
            ));
        }

        let hub = FrameHub::new();
        let mut tracks: Vec<Box<dyn TrackSource>> = Vec::new();

        let audio = constraints.audio.then_some(self.audio);
        if let Some(settings) = audio {
            tracks.push(Box::new(GeneratorTrack {
                kind: TrackKind::Audio,
                task: tokio::spawn(generate_tone(settings, hub.clone())),
            }));
        }

        let video = constraints.video.then_some(self.video);
        if let Some(settings) = video {
            tracks.push(Box::new(GeneratorTrack {
                kind: TrackKind::Video,
                task: tokio::spawn(generate_pattern(settings, hub.clone())),
            }));
        }

        Ok(LiveStream::new(LiveStream::new_id(), hub, audio, video, tracks))
    }
}

struct GeneratorTrack {
    kind: TrackKind,
    task: JoinHandle<()>,
}

impl TrackSource for GeneratorTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&mut self) {
        self.task.abort();
    }
}

async fn generate_tone(settings: AudioSettings, hub: FrameHub) {
    let block_len = (settings.sample_rate as u64 * AUDIO_BLOCK.as_millis() as u64 / 1000) as usize;
    let step = 2.0 * std::f32::consts::PI * TONE_HZ / settings.sample_rate as f32;
    let mut phase = 0.0f32;
    let mut interval = tokio::time::interval(AUDIO_BLOCK);

    loop {
        interval.tick().await;
        let block: Vec<i16> = (0..block_len)
            .map(|_| {
                let sample = (phase.sin() * 0.25 * i16::MAX as f32) as i16;
                phase = (phase + step) % (2.0 * std::f32::consts::PI);
                sample
            })
            .collect();
        hub.publish(MediaFrame::Audio(Arc::from(block)));
    }
}

async fn generate_pattern(settings: VideoSettings, hub: FrameHub) {
    let period = Duration::from_millis(1000 / settings.frame_rate.max(1) as u64);
    let mut interval = tokio::time::interval(period);
    let mut frame_index = 0usize;

    loop {
        interval.tick().await;
        hub.publish(MediaFrame::Video(Arc::from(colour_bars(
            settings,
            frame_index,
        ))));
        frame_index = frame_index.wrapping_add(1);
    }
}

/// Eight vertical bars, shifted one column per frame.
fn colour_bars(settings: VideoSettings, offset: usize) -> Vec<u8> {
    let width = settings.width as usize;
    let bar_width = (width / BARS.len()).max(1);
    let mut frame = Vec::with_capacity(settings.frame_len());

    for _ in 0..settings.height {
        for x in 0..width {
            let bar = ((x + offset) / bar_width) % BARS.len();
            frame.extend_from_slice(&BARS[bar]);
        }
    }
    frame
}
