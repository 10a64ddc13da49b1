//! Recording formats and format negotiation.
//!
//! A format is a media type string such as `audio/webm;codecs=opus`. The
//! recorder walks an ordered preference list and uses the first entry the
//! encoder host can produce for the stream's tracks.

use crate::capture::{MediaKind, TrackKind};
use std::fmt;

/// Container a recording is written in. Determines the export extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Webm,
    Ogg,
    Wav,
    Mp4,
    Matroska,
}

impl Container {
    fn from_subtype(subtype: &str) -> Option<Self> {
        match subtype {
            "webm" => Some(Self::Webm),
            "ogg" => Some(Self::Ogg),
            "wav" | "wave" | "x-wav" => Some(Self::Wav),
            "mp4" => Some(Self::Mp4),
            "x-matroska" | "matroska" => Some(Self::Matroska),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Webm => "webm",
            Self::Ogg => "ogg",
            Self::Wav => "wav",
            Self::Mp4 => "mp4",
            Self::Matroska => "mkv",
        }
    }

    /// ffmpeg muxer name for this container.
    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Webm => "webm",
            Self::Ogg => "ogg",
            Self::Wav => "wav",
            Self::Mp4 => "mp4",
            Self::Matroska => "matroska",
        }
    }
}

/// A parsed recording media type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaFormat {
    kind: MediaKind,
    container: Container,
    codecs: Option<String>,
}

impl MediaFormat {
    /// Parses `type/subtype[;codecs=...]`. Whitespace around parameters is
    /// tolerated and unknown parameters are ignored.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(';');
        let essence = parts.next()?.trim().to_ascii_lowercase();
        let (top, subtype) = essence.split_once('/')?;
        let kind = MediaKind::parse(top)?;
        let container = Container::from_subtype(subtype)?;

        let codecs = parts.find_map(|param| {
            let (name, value) = param.split_once('=')?;
            (name.trim().eq_ignore_ascii_case("codecs"))
                .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
                .filter(|v| !v.is_empty())
        });

        Some(Self {
            kind,
            container,
            codecs,
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn container(&self) -> Container {
        self.container
    }

    pub fn codecs(&self) -> Option<&str> {
        self.codecs.as_deref()
    }

    /// File extension used when exporting.
    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }

    /// The media type string, normalised.
    pub fn mime(&self) -> String {
        self.to_string()
    }

    /// Native PCM WAV, the one format produced without external tools.
    pub fn is_wav(&self) -> bool {
        self.container == Container::Wav
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subtype = match self.container {
            Container::Matroska => "x-matroska",
            other => other.extension(),
        };
        write!(f, "{}/{}", self.kind, subtype)?;
        if let Some(codecs) = &self.codecs {
            write!(f, ";codecs={codecs}")?;
        }
        Ok(())
    }
}

/// Ordered format preferences for each recording kind, best first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPreferences {
    audio: Vec<MediaFormat>,
    video: Vec<MediaFormat>,
}

impl FormatPreferences {
    pub fn new(audio: Vec<MediaFormat>, video: Vec<MediaFormat>) -> Self {
        Self { audio, video }
    }

    pub fn for_kind(&self, kind: MediaKind) -> &[MediaFormat] {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }
}

impl Default for FormatPreferences {
    fn default() -> Self {
        fn parse_all(list: &[&str]) -> Vec<MediaFormat> {
            list.iter().filter_map(|m| MediaFormat::parse(m)).collect()
        }

        Self {
            audio: parse_all(&["audio/webm;codecs=opus", "audio/ogg;codecs=opus", "audio/wav"]),
            video: parse_all(&["video/webm;codecs=vp9", "video/webm", "video/mp4"]),
        }
    }
}

/// Capability query used during negotiation.
pub trait FormatSupport {
    fn is_supported(&self, format: &MediaFormat, tracks: &[TrackKind]) -> bool;
}

/// Picks the first preferred format the host supports for `tracks`.
pub fn negotiate<S: FormatSupport + ?Sized>(
    preferences: &[MediaFormat],
    tracks: &[TrackKind],
    support: &S,
) -> Option<MediaFormat> {
    let chosen = preferences
        .iter()
        .find(|format| support.is_supported(format, tracks))
        .cloned();

    match &chosen {
        Some(format) => tracing::debug!("Negotiated recording format {}", format),
        None => tracing::warn!(
            "None of the preferred formats are supported for tracks {:?}",
            tracks
        ),
    }
    chosen
}
