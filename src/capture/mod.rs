//! Live capture streams for tapedeck.
//!
//! A capture session owns at most one live stream at a time. Streams are
//! obtained from a `MediaDevices` host capability: the real host (cpal
//! microphone plus an ffmpeg-driven camera) or a synthetic generator used by
//! tests and demos.

pub mod camera;
pub mod host;
pub mod microphone;
pub mod session;
pub mod stream;
pub mod synthetic;

use serde::{Deserialize, Serialize};

pub use host::HostDevices;
pub use session::CaptureSession;
pub use stream::{
    AudioSettings, Constraints, FrameHub, LiveStream, MediaDevices, MediaFrame, StreamEvent,
    StreamEventSender, TrackKind, TrackSource, VideoSettings,
};
pub use synthetic::SyntheticDevices;

/// What a recording captures: microphone only, or camera plus microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// The other mode, used by the mode toggle.
    pub fn toggled(&self) -> Self {
        match self {
            Self::Audio => Self::Video,
            Self::Video => Self::Audio,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
