//! Encoder primitive and its event channel.
//!
//! An encoder consumes a live stream's frames and reports back through an
//! [`EventSink`]: encoded chunks roughly every timeslice, then exactly one
//! `Finished` (or `Failed`) after it was stopped or its input ended. Every
//! event carries the attempt number it was created for, so the recorder can
//! discard output from attempts it has already abandoned.

use super::ffmpeg::{self, FfmpegEncoder};
use super::format::{FormatSupport, MediaFormat};
use super::wav::WavEncoder;
use crate::capture::{LiveStream, MediaKind, TrackKind};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// What an encoder reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A non-empty slice of encoded output, in production order
    Data(Vec<u8>),
    /// Output is complete; no further events follow for this attempt
    Finished,
    /// The encoder gave up; no further events follow for this attempt
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderEvent {
    pub attempt: u64,
    pub kind: EventKind,
}

pub type RecorderEventSender = mpsc::UnboundedSender<RecorderEvent>;
pub type RecorderEventReceiver = mpsc::UnboundedReceiver<RecorderEvent>;

/// Sending half handed to one encoder, stamped with its attempt number.
#[derive(Debug, Clone)]
pub struct EventSink {
    attempt: u64,
    tx: RecorderEventSender,
}

impl EventSink {
    pub fn new(attempt: u64, tx: RecorderEventSender) -> Self {
        Self { attempt, tx }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Empty slices are dropped.
    pub fn data(&self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.send(EventKind::Data(bytes));
        }
    }

    pub fn finished(&self) {
        self.send(EventKind::Finished);
    }

    pub fn failed(&self, message: impl Into<String>) {
        self.send(EventKind::Failed(message.into()));
    }

    fn send(&self, kind: EventKind) {
        if self
            .tx
            .send(RecorderEvent {
                attempt: self.attempt,
                kind,
            })
            .is_err()
        {
            tracing::debug!("Recorder gone, dropping encoder event for attempt {}", self.attempt);
        }
    }
}

/// Control messages accepted by a running encoder task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderCommand {
    Pause,
    Resume,
    Stop,
}

/// A running encoder. Calls return immediately; results arrive as events.
pub trait MediaEncoder {
    fn pause(&mut self);
    fn resume(&mut self);
    /// Flushes pending output and ends the attempt with `Finished`.
    fn stop(&mut self);
}

/// Encoder backed by a task that receives [`EncoderCommand`]s.
pub struct EncoderHandle {
    tx: mpsc::UnboundedSender<EncoderCommand>,
}

impl EncoderHandle {
    pub fn new(tx: mpsc::UnboundedSender<EncoderCommand>) -> Self {
        Self { tx }
    }

    fn send(&self, command: EncoderCommand) {
        if self.tx.send(command).is_err() {
            tracing::debug!("Encoder task already ended, ignoring {:?}", command);
        }
    }
}

impl MediaEncoder for EncoderHandle {
    fn pause(&mut self) {
        self.send(EncoderCommand::Pause);
    }

    fn resume(&mut self) {
        self.send(EncoderCommand::Resume);
    }

    fn stop(&mut self) {
        self.send(EncoderCommand::Stop);
    }
}

/// Builds encoders for negotiated formats.
pub trait EncoderHost: FormatSupport {
    /// Starts encoding `stream` into `format`, emitting a chunk roughly
    /// every `timeslice`.
    ///
    /// # Errors
    /// Returns a description of why the encoder could not be constructed.
    fn create(
        &self,
        stream: &LiveStream,
        format: &MediaFormat,
        timeslice: Duration,
        sink: EventSink,
    ) -> Result<Box<dyn MediaEncoder>, String>;
}

/// Native WAV for audio plus whatever the local ffmpeg can produce.
pub struct PlatformEncoders {
    ffmpeg: Option<PathBuf>,
    available: Vec<String>,
}

impl PlatformEncoders {
    /// Looks for ffmpeg and records which encoders it was built with.
    pub fn detect() -> Self {
        match ffmpeg::find_ffmpeg() {
            Ok(path) => {
                let available = ffmpeg::list_encoders(&path).unwrap_or_else(|e| {
                    tracing::warn!("Could not list ffmpeg encoders: {}", e);
                    Vec::new()
                });
                tracing::info!(
                    "Using ffmpeg at {} ({} encoders)",
                    path.display(),
                    available.len()
                );
                Self {
                    ffmpeg: Some(path),
                    available,
                }
            }
            Err(e) => {
                tracing::warn!("ffmpeg unavailable, only WAV audio can be recorded: {}", e);
                Self::wav_only()
            }
        }
    }

    /// A host without ffmpeg.
    pub fn wav_only() -> Self {
        Self {
            ffmpeg: None,
            available: Vec::new(),
        }
    }

    pub fn ffmpeg(&self) -> Option<&std::path::Path> {
        self.ffmpeg.as_deref()
    }

    fn has_encoder(&self, name: &str) -> bool {
        self.available.iter().any(|e| e == name)
    }
}

impl FormatSupport for PlatformEncoders {
    fn is_supported(&self, format: &MediaFormat, tracks: &[TrackKind]) -> bool {
        let has_video = tracks.contains(&TrackKind::Video);
        let has_audio = tracks.contains(&TrackKind::Audio);

        match format.kind() {
            MediaKind::Audio if has_video || !has_audio => return false,
            MediaKind::Video if !has_video => return false,
            _ => {}
        }

        if format.is_wav() {
            return format.kind() == MediaKind::Audio;
        }
        if self.ffmpeg.is_none() {
            return false;
        }

        match ffmpeg::codec_plan(format) {
            Some(plan) => {
                let video_ok = !has_video || plan.video.is_some_and(|v| self.has_encoder(v));
                let audio_ok = !has_audio || self.has_encoder(plan.audio);
                video_ok && audio_ok
            }
            None => false,
        }
    }
}

impl EncoderHost for PlatformEncoders {
    fn create(
        &self,
        stream: &LiveStream,
        format: &MediaFormat,
        timeslice: Duration,
        sink: EventSink,
    ) -> Result<Box<dyn MediaEncoder>, String> {
        if format.is_wav() {
            let settings = stream
                .audio_settings()
                .ok_or_else(|| "stream has no audio track".to_string())?;
            return Ok(Box::new(WavEncoder::spawn(
                stream.subscribe(),
                settings,
                timeslice,
                sink,
            )));
        }

        let ffmpeg = self
            .ffmpeg
            .as_ref()
            .ok_or_else(|| format!("{format} requires ffmpeg"))?;
        let encoder = FfmpegEncoder::spawn(ffmpeg, stream, format, timeslice, sink)
            .map_err(|e| format!("{e:#}"))?;
        Ok(Box::new(encoder))
    }
}
