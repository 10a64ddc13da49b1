//! Recorder state machine.
//!
//! Wraps one encoder at a time and buffers its output. Phases move
//! `Idle -> Recording <-> Paused -> Stopped`, and `clear` returns to `Idle`
//! from anywhere. Encoder output arrives as [`RecorderEvent`]s on a channel
//! and is applied by [`Recorder::handle_event`] on the event-loop thread, in
//! arrival order. Events from abandoned attempts are dropped.

use super::encoder::{
    EncoderHost, EventKind, EventSink, MediaEncoder, RecorderEvent, RecorderEventReceiver,
    RecorderEventSender,
};
use super::format::{negotiate, FormatPreferences, MediaFormat};
use crate::capture::{LiveStream, MediaKind, TrackKind};
use crate::error::RecorderError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Lifecycle phase of the current recording attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::Recording => "Recording",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
        }
    }
}

/// A finished recording's bytes and their format. Clones share the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    bytes: Arc<[u8]>,
    format: MediaFormat,
}

impl Media {
    pub fn new(bytes: Vec<u8>, format: MediaFormat) -> Self {
        Self {
            bytes: Arc::from(bytes),
            format,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> &MediaFormat {
        &self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub struct Recorder {
    host: Box<dyn EncoderHost>,
    preferences: FormatPreferences,
    timeslice: Duration,
    events_tx: RecorderEventSender,
    phase: Phase,
    chunks: Vec<Vec<u8>>,
    encoder: Option<Box<dyn MediaEncoder>>,
    format: Option<MediaFormat>,
    media: Option<Media>,
    attempt: u64,
    attempt_ended: bool,
    error: Option<String>,
}

impl Recorder {
    /// Creates an idle recorder and the receiver its encoders report to.
    pub fn new(
        host: Box<dyn EncoderHost>,
        preferences: FormatPreferences,
        timeslice: Duration,
    ) -> (Self, RecorderEventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                host,
                preferences,
                timeslice,
                events_tx,
                phase: Phase::Idle,
                chunks: Vec::new(),
                encoder: None,
                format: None,
                media: None,
                attempt: 0,
                attempt_ended: true,
                error: None,
            },
            events_rx,
        )
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True while Recording or Paused.
    pub fn is_recording(&self) -> bool {
        matches!(self.phase, Phase::Recording | Phase::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.phase == Phase::Paused
    }

    pub fn has_recording(&self) -> bool {
        self.media.is_some()
    }

    pub fn media(&self) -> Option<&Media> {
        self.media.as_ref()
    }

    /// Format negotiated for the current attempt.
    pub fn format(&self) -> Option<&MediaFormat> {
        self.format.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Stopped, with the encoder's final flush still outstanding.
    pub fn is_flushing(&self) -> bool {
        self.phase == Phase::Stopped && !self.attempt_ended
    }

    /// Starts a new attempt on `stream`.
    ///
    /// Returns `Ok(false)` without side effects while an attempt is already
    /// running. On error the phase is unchanged and `error()` is set.
    ///
    /// # Errors
    /// - `StreamInactive` if the stream has been stopped
    /// - `EncoderInit` if no preferred format is supported or the encoder
    ///   cannot be constructed
    pub fn start(&mut self, stream: &LiveStream) -> Result<bool, RecorderError> {
        if self.is_recording() {
            tracing::debug!("Ignoring start while {:?}", self.phase);
            return Ok(false);
        }

        match self.begin(stream) {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::error!("{}", e);
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn begin(&mut self, stream: &LiveStream) -> Result<(), RecorderError> {
        self.error = None;
        if !stream.is_active() {
            return Err(RecorderError::StreamInactive);
        }

        let tracks = stream.track_kinds();
        let kind = if tracks.contains(&TrackKind::Video) {
            MediaKind::Video
        } else {
            MediaKind::Audio
        };
        let format = negotiate(self.preferences.for_kind(kind), &tracks, self.host.as_ref())
            .ok_or_else(|| {
                RecorderError::EncoderInit(format!("no supported {kind} recording format"))
            })?;

        self.attempt += 1;
        self.chunks.clear();
        self.media = None;

        let sink = EventSink::new(self.attempt, self.events_tx.clone());
        let encoder = self
            .host
            .create(stream, &format, self.timeslice, sink)
            .map_err(RecorderError::EncoderInit)?;

        tracing::info!(
            "Recording attempt {} started as {} from stream {}",
            self.attempt,
            format,
            stream.id()
        );
        self.encoder = Some(encoder);
        self.format = Some(format);
        self.attempt_ended = false;
        self.phase = Phase::Recording;
        Ok(())
    }

    pub fn pause(&mut self) -> bool {
        if self.phase != Phase::Recording {
            tracing::debug!("Ignoring pause while {:?}", self.phase);
            return false;
        }
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.pause();
        }
        self.phase = Phase::Paused;
        tracing::info!("Recording paused");
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.phase != Phase::Paused {
            tracing::debug!("Ignoring resume while {:?}", self.phase);
            return false;
        }
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.resume();
        }
        self.phase = Phase::Recording;
        tracing::info!("Recording resumed");
        true
    }

    /// Asks the encoder to flush. The media becomes available once its
    /// `Finished` event has been handled.
    pub fn stop(&mut self) -> bool {
        if !self.is_recording() {
            tracing::debug!("Ignoring stop while {:?}", self.phase);
            return false;
        }
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.stop();
        }
        self.phase = Phase::Stopped;
        tracing::info!("Recording stopped, waiting for encoder flush");
        true
    }

    /// Abandons the current attempt and any finished media.
    pub fn clear(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            if !self.attempt_ended {
                encoder.stop();
            }
        }
        self.attempt += 1;
        self.attempt_ended = true;
        self.chunks.clear();
        self.media = None;
        self.format = None;
        self.error = None;
        self.phase = Phase::Idle;
        tracing::debug!("Recorder cleared");
    }

    /// Applies one encoder notification.
    ///
    /// Returns the finished media when this event completed the attempt.
    pub fn handle_event(&mut self, event: RecorderEvent) -> Option<Media> {
        if event.attempt != self.attempt || self.attempt_ended {
            tracing::debug!(
                "Discarding encoder event for attempt {} (current {})",
                event.attempt,
                self.attempt
            );
            return None;
        }

        match event.kind {
            EventKind::Data(bytes) => {
                self.chunks.push(bytes);
                None
            }
            EventKind::Finished => {
                self.end_attempt();
                let format = self.format.clone()?;
                let media = Media::new(std::mem::take(&mut self.chunks).concat(), format);
                tracing::info!(
                    "Recording attempt {} finished: {} bytes of {}",
                    self.attempt,
                    media.len(),
                    media.format()
                );
                self.media = Some(media.clone());
                Some(media)
            }
            EventKind::Failed(message) => {
                self.end_attempt();
                self.chunks.clear();
                tracing::error!("Recording attempt {} failed: {}", self.attempt, message);
                self.error = Some(format!("Recording failed: {message}"));
                None
            }
        }
    }

    fn end_attempt(&mut self) {
        self.attempt_ended = true;
        self.encoder = None;
        if self.is_recording() {
            tracing::info!("Encoder ended the recording on its own");
        }
        self.phase = Phase::Stopped;
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            if !self.attempt_ended {
                encoder.stop();
            }
        }
    }
}
