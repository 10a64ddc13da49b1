//! Real capture host: cpal microphone plus ffmpeg camera.

use super::camera::open_camera;
use super::microphone::open_microphone;
use super::stream::{
    Constraints, FrameHub, LiveStream, MediaDevices, StreamEventSender, TrackSource,
};
use crate::config::{AudioConfig, VideoConfig};
use crate::error::CaptureError;
use async_trait::async_trait;

/// Grants streams from the machine's own input devices.
pub struct HostDevices {
    audio_device: String,
    video: VideoConfig,
}

impl HostDevices {
    pub fn new(audio: &AudioConfig, video: &VideoConfig) -> Self {
        Self {
            audio_device: audio.device.clone(),
            video: video.clone(),
        }
    }
}

#[async_trait(?Send)]
impl MediaDevices for HostDevices {
    async fn get_user_media(
        &self,
        constraints: Constraints,
        events: StreamEventSender,
    ) -> Result<LiveStream, CaptureError> {
        let stream_id = LiveStream::new_id();
        let hub = FrameHub::new();
        let mut tracks: Vec<Box<dyn TrackSource>> = Vec::new();

        let mut audio = None;
        if constraints.audio {
            let (track, settings) =
                open_microphone(&self.audio_device, &stream_id, hub.clone(), events.clone())?;
            tracks.push(Box::new(track));
            audio = Some(settings);
        }

        let mut video = None;
        if constraints.video {
            let (track, settings) =
                match open_camera(&self.video, &stream_id, hub.clone(), events).await {
                    Ok(opened) => opened,
                    Err(e) => {
                        for track in &mut tracks {
                            track.stop();
                        }
                        return Err(e);
                    }
                };
            tracks.push(Box::new(track));
            video = Some(settings);
        }

        Ok(LiveStream::new(stream_id, hub, audio, video, tracks))
    }
}
