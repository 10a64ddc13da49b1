//! Stream handles, track sources and frame fan-out.

use super::MediaKind;
use crate::error::CaptureError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Kind of a single input track within a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Which tracks a capture request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    pub audio: bool,
    pub video: bool,
}

impl Constraints {
    /// Audio-only for `Audio`, audio plus video for `Video`.
    pub fn for_kind(kind: MediaKind) -> Self {
        Self {
            audio: true,
            video: kind == MediaKind::Video,
        }
    }
}

/// Format of the audio frames published by a stream (always 16-bit PCM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Format of the video frames published by a stream (always packed RGB24).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl VideoSettings {
    /// Size in bytes of one RGB24 frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// One unit of captured input, shared between subscribers.
#[derive(Debug, Clone)]
pub enum MediaFrame {
    /// Interleaved i16 samples in the stream's `AudioSettings`
    Audio(Arc<[i16]>),
    /// One RGB24 picture in the stream's `VideoSettings`
    Video(Arc<[u8]>),
}

/// Signals emitted by a stream outside of the frame flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A track stopped on its own (device unplugged, capture process exited).
    TrackEnded {
        stream_id: String,
        track: TrackKind,
        reason: String,
    },
}

pub type StreamEventSender = mpsc::UnboundedSender<StreamEvent>;

/// Fans captured frames out to every subscriber, in capture order.
///
/// Capture callbacks run on driver threads, so the subscriber list is the
/// only state shared with them. Closed subscribers are pruned on publish.
#[derive(Clone, Default)]
pub struct FrameHub {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<MediaFrame>>>>,
}

impl FrameHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MediaFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn publish(&self, frame: MediaFrame) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(frame.clone()).is_ok());
        }
    }

    /// Drops every subscriber so their receivers observe the end of the feed.
    pub fn close(&self) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.clear();
        }
    }
}

/// A running input track. Stopping it releases the underlying device.
pub trait TrackSource {
    fn kind(&self) -> TrackKind;
    fn stop(&mut self);
}

/// Host capability that grants capture streams.
///
/// Implementations may hold `!Send` driver handles, so the trait is used from
/// the single event-loop thread only.
#[async_trait(?Send)]
pub trait MediaDevices {
    /// Requests a stream with the given tracks.
    ///
    /// # Errors
    /// - `PermissionDenied` if access is refused
    /// - `DeviceUnavailable` if no matching input device can be opened
    async fn get_user_media(
        &self,
        constraints: Constraints,
        events: StreamEventSender,
    ) -> Result<LiveStream, CaptureError>;
}

/// An acquired capture stream, exclusively owned by its capture session.
pub struct LiveStream {
    id: String,
    tracks: Vec<Box<dyn TrackSource>>,
    audio: Option<AudioSettings>,
    video: Option<VideoSettings>,
    hub: FrameHub,
    active: bool,
}

impl std::fmt::Debug for LiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .field("audio", &self.audio)
            .field("video", &self.video)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl LiveStream {
    pub fn new(
        id: String,
        hub: FrameHub,
        audio: Option<AudioSettings>,
        video: Option<VideoSettings>,
        tracks: Vec<Box<dyn TrackSource>>,
    ) -> Self {
        Self {
            id,
            tracks,
            audio,
            video,
            hub,
            active: true,
        }
    }

    /// Fresh opaque stream identifier.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn track_kinds(&self) -> Vec<TrackKind> {
        self.tracks.iter().map(|t| t.kind()).collect()
    }

    pub fn audio_settings(&self) -> Option<AudioSettings> {
        self.audio
    }

    pub fn video_settings(&self) -> Option<VideoSettings> {
        self.video
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Opens a new frame feed. Frames captured from now on are delivered in order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MediaFrame> {
        self.hub.subscribe()
    }

    /// Stops every track and ends all frame feeds.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        for track in &mut self.tracks {
            track.stop();
        }
        self.hub.close();
        self.active = false;
        tracing::info!("Capture stream {} stopped", self.id);
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingTrack {
        kind: TrackKind,
        stops: Rc<Cell<u32>>,
    }

    impl TrackSource for CountingTrack {
        fn kind(&self) -> TrackKind {
            self.kind
        }

        fn stop(&mut self) {
            self.stops.set(self.stops.get() + 1);
        }
    }

    #[test]
    fn hub_delivers_frames_in_order_to_every_subscriber() {
        let hub = FrameHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        for n in 0..3i16 {
            hub.publish(MediaFrame::Audio(Arc::from(vec![n])));
        }

        for rx in [&mut first, &mut second] {
            for n in 0..3i16 {
                match rx.try_recv() {
                    Ok(MediaFrame::Audio(samples)) => assert_eq!(samples[0], n),
                    other => panic!("unexpected frame: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn hub_prunes_closed_subscribers() {
        let hub = FrameHub::new();
        let rx = hub.subscribe();
        let _kept = hub.subscribe();
        drop(rx);
        hub.publish(MediaFrame::Video(Arc::from(vec![0u8; 3])));
        assert_eq!(hub.subscribers.lock().unwrap().len(), 1);
    }

    #[test]
    fn stop_stops_tracks_once_and_ends_feeds() {
        let stops = Rc::new(Cell::new(0));
        let hub = FrameHub::new();
        let mut stream = LiveStream::new(
            LiveStream::new_id(),
            hub.clone(),
            Some(AudioSettings {
                sample_rate: 16000,
                channels: 1,
            }),
            None,
            vec![Box::new(CountingTrack {
                kind: TrackKind::Audio,
                stops: stops.clone(),
            })],
        );
        let mut feed = stream.subscribe();

        stream.stop();
        stream.stop();
        drop(stream);

        assert_eq!(stops.get(), 1);
        assert!(matches!(
            feed.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn constraints_follow_kind() {
        assert_eq!(
            Constraints::for_kind(MediaKind::Audio),
            Constraints {
                audio: true,
                video: false
            }
        );
        assert!(Constraints::for_kind(MediaKind::Video).video);
    }
}
