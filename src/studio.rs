//! The studio: capture session, recorder, timer and recordings in one place.
//!
//! Owns every component explicitly and turns user intents into calls on
//! them. All methods run on the event-loop thread; encoder and stream
//! notifications are fed back in through `handle_recorder_event` and
//! `handle_stream_event`.

use crate::capture::{CaptureSession, LiveStream, MediaDevices, MediaKind, StreamEvent};
use crate::config::TapedeckConfig;
use crate::history::{self, Journal, Recording, RecordingId, RecordingStore};
use crate::recording::encoder::{EncoderHost, RecorderEvent, RecorderEventReceiver};
use crate::recording::format::FormatPreferences;
use crate::recording::playback::Playback;
use crate::recording::recorder::{Media, Phase, Recorder};
use crate::recording::timer::Timer;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Construction parameters for a [`Studio`].
pub struct StudioSettings {
    pub mode: MediaKind,
    pub preferences: FormatPreferences,
    pub timeslice: Duration,
    pub output_dir: PathBuf,
    pub journal: Option<Journal>,
}

impl StudioSettings {
    /// Settings from the loaded configuration.
    pub fn from_config(config: &TapedeckConfig, journal: Option<Journal>) -> anyhow::Result<Self> {
        Ok(Self {
            mode: config.recording.default_mode,
            preferences: FormatPreferences::new(
                config.formats.preferences(MediaKind::Audio)?,
                config.formats.preferences(MediaKind::Video)?,
            ),
            timeslice: Duration::from_millis(config.recording.timeslice_ms),
            output_dir: config.output_dir(),
            journal,
        })
    }
}

/// Receivers the event loop must drain into the studio.
pub struct StudioEvents {
    pub recorder: RecorderEventReceiver,
    pub stream: mpsc::UnboundedReceiver<StreamEvent>,
}

pub struct Studio {
    session: CaptureSession,
    recorder: Recorder,
    timer: Timer,
    store: RecordingStore,
    journal: Option<Journal>,
    playback: Playback,
    output_dir: PathBuf,
    current: Option<RecordingId>,
    capture_error: Option<String>,
    action_error: Option<String>,
    notice: Option<String>,
}

impl Studio {
    pub fn new(
        devices: Box<dyn MediaDevices>,
        encoders: Box<dyn EncoderHost>,
        settings: StudioSettings,
    ) -> (Self, StudioEvents) {
        let (session, stream_rx) = CaptureSession::new(devices, settings.mode);
        let (recorder, recorder_rx) =
            Recorder::new(encoders, settings.preferences, settings.timeslice);

        (
            Self {
                session,
                recorder,
                timer: Timer::new(),
                store: RecordingStore::new(),
                journal: settings.journal,
                playback: Playback::new(),
                output_dir: settings.output_dir,
                current: None,
                capture_error: None,
                action_error: None,
                notice: None,
            },
            StudioEvents {
                recorder: recorder_rx,
                stream: stream_rx,
            },
        )
    }

    pub fn mode(&self) -> MediaKind {
        self.session.mode()
    }

    pub fn phase(&self) -> Phase {
        self.recorder.phase()
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn stream(&self) -> Option<&LiveStream> {
        self.session.stream()
    }

    pub fn store(&self) -> &RecordingStore {
        &self.store
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The recording currently on display.
    pub fn current(&self) -> Option<&Recording> {
        self.current.and_then(|id| self.store.get(id))
    }

    /// The one error message to show, if any.
    pub fn error(&self) -> Option<&str> {
        self.capture_error
            .as_deref()
            .or(self.recorder.error())
            .or(self.action_error.as_deref())
    }

    /// Latest informational message (export path, playback).
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Starts a new recording, or resumes a paused one.
    ///
    /// A finished take is cleared first. Nothing happens while a stopped
    /// take is still being flushed. A stream is acquired if none is live; a
    /// refusal is reported through `error()` and nothing starts.
    pub async fn start_or_resume(&mut self) {
        if self.recorder.is_paused() {
            if self.recorder.resume() {
                self.timer.start();
            }
            return;
        }
        if self.recorder.is_recording() {
            tracing::debug!("Start requested while already recording");
            return;
        }
        if self.recorder.is_flushing() {
            tracing::debug!("Start requested before the last take was saved");
            return;
        }

        if self.recorder.has_recording() || self.recorder.phase() == Phase::Stopped {
            self.recorder.clear();
            self.current = None;
        }
        self.capture_error = None;
        self.action_error = None;
        self.notice = None;

        let mode = self.session.mode();
        let stream = match self.session.acquire(mode).await {
            Ok(stream) => stream,
            Err(e) => {
                self.capture_error = Some(e.user_message());
                return;
            }
        };

        match self.recorder.start(stream) {
            Ok(true) => {
                self.timer.reset();
                self.timer.start();
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Recording did not start: {}", e),
        }
    }

    pub fn pause(&mut self) -> bool {
        let paused = self.recorder.pause();
        if paused {
            self.timer.pause();
        }
        paused
    }

    /// Pauses when recording, resumes when paused.
    pub async fn toggle_pause(&mut self) {
        if self.recorder.is_paused() {
            self.start_or_resume().await;
        } else {
            self.pause();
        }
    }

    /// Stops recording. The take is saved once the encoder has flushed.
    pub fn stop(&mut self) -> bool {
        let stopped = self.recorder.stop();
        if stopped {
            self.timer.pause();
        }
        stopped
    }

    /// Switches between audio and video capture.
    ///
    /// Rejected while recording, paused or flushing a stopped take. Otherwise
    /// the live stream is
    /// released, the take and selection are cleared and the timer reset.
    pub fn switch_mode(&mut self, mode: MediaKind) -> bool {
        if self.recorder.is_recording() {
            tracing::debug!("Ignoring switch to {} mode while recording", mode);
            return false;
        }
        if self.recorder.is_flushing() {
            tracing::debug!("Ignoring switch to {} mode before the last take was saved", mode);
            return false;
        }

        self.session.release();
        if !self.session.switch_mode(mode) {
            return false;
        }
        self.recorder.clear();
        self.current = None;
        self.capture_error = None;
        self.action_error = None;
        self.timer.reset();
        tracing::info!("Switched to {} mode", mode);
        true
    }

    /// Feeds one encoder notification to the recorder and saves the take
    /// when it completes.
    pub fn handle_recorder_event(&mut self, event: RecorderEvent) {
        if let Some(media) = self.recorder.handle_event(event) {
            self.timer.pause();
            self.save_take(media);
        }
    }

    fn save_take(&mut self, media: Media) {
        let recording = Recording::new(media, self.timer.seconds(), self.session.mode());
        tracing::info!(
            "Saved {} recording {} ({}s, {} bytes)",
            recording.kind,
            recording.id,
            recording.duration_seconds,
            recording.media.len()
        );

        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.record(&recording) {
                tracing::warn!("Failed to journal recording: {}", e);
            }
        }

        self.current = Some(recording.id);
        self.store.append(recording);
    }

    /// Applies a capture stream signal. A recording whose input ended is stopped.
    pub fn handle_stream_event(&mut self, event: StreamEvent) {
        if !self.session.handle_event(&event) {
            return;
        }
        let StreamEvent::TrackEnded { reason, .. } = event;
        if self.stop() {
            tracing::warn!("Recording stopped because capture ended");
        }
        self.notice = Some(format!("Capture ended: {reason}"));
    }

    /// One-second heartbeat.
    pub fn tick(&mut self) {
        self.timer.tick();
    }

    /// Makes a recording the current one and returns it for playback.
    pub fn select(&mut self, id: RecordingId) -> Option<&Recording> {
        let recording = self.store.get(id)?;
        self.current = Some(id);
        Some(recording)
    }

    /// Selects a recording and opens it in the system player.
    pub fn play(&mut self, id: RecordingId) -> Option<PathBuf> {
        let recording = self.store.get(id)?;
        self.current = Some(id);
        match self.playback.play(recording) {
            Ok(path) => {
                self.action_error = None;
                self.notice = Some(format!("Playing {}", path.display()));
                Some(path)
            }
            Err(e) => {
                tracing::error!("Playback failed: {}", e);
                self.action_error = Some(e.to_string());
                None
            }
        }
    }

    /// Writes a stored recording to the output directory.
    pub fn export(&mut self, id: RecordingId) -> Option<PathBuf> {
        let recording = self.store.get(id)?;
        match history::export(recording, &self.output_dir) {
            Ok(path) => {
                if let Some(journal) = self.journal.as_mut() {
                    if let Err(e) = journal.mark_exported(id, &path) {
                        tracing::warn!("Failed to journal export: {}", e);
                    }
                }
                self.action_error = None;
                self.notice = Some(format!("Saved {}", path.display()));
                Some(path)
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.action_error = Some(e.to_string());
                None
            }
        }
    }

    /// Exports the take shown as current.
    pub fn export_take(&mut self) -> Option<PathBuf> {
        let id = self.current?;
        self.export(id)
    }

    /// Removes a recording. The selection is cleared when it pointed at it.
    pub fn delete(&mut self, id: RecordingId) -> bool {
        let Some(removed) = self.store.delete(id) else {
            return false;
        };
        if self.current == Some(id) {
            self.current = None;
        }
        self.playback.forget(id);
        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.mark_deleted(id) {
                tracing::warn!("Failed to journal deletion: {}", e);
            }
        }
        tracing::info!("Deleted recording {}", removed.id);
        true
    }

    /// Deletes the current recording and discards the finished take.
    pub fn delete_current(&mut self) {
        if let Some(id) = self.current {
            self.delete(id);
        }
        if !self.recorder.is_recording() {
            self.recorder.clear();
        }
        self.current = None;
    }

    /// Stops any recording, releases capture devices and drops all media.
    pub fn shutdown(&mut self) {
        self.stop();
        self.recorder.clear();
        self.session.release();
        self.store.clear();
        self.playback = Playback::new();
        self.current = None;
        tracing::info!("Studio shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SyntheticDevices, TrackKind};
    use crate::recording::encoder::PlatformEncoders;

    fn settings(mode: MediaKind, output_dir: &Path, journal: Option<Journal>) -> StudioSettings {
        StudioSettings {
            mode,
            preferences: FormatPreferences::default(),
            timeslice: Duration::from_secs(1),
            output_dir: output_dir.to_path_buf(),
            journal,
        }
    }

    fn studio(devices: SyntheticDevices, mode: MediaKind, output_dir: &Path) -> (Studio, StudioEvents) {
        Studio::new(
            Box::new(devices),
            Box::new(PlatformEncoders::wav_only()),
            settings(mode, output_dir, None),
        )
    }

    /// Drains recorder events until the take has been saved.
    async fn finish(studio: &mut Studio, events: &mut StudioEvents) {
        while studio.current().is_none() && studio.recorder().error().is_none() {
            let event = events.recorder.recv().await.expect("recorder channel closed");
            studio.handle_recorder_event(event);
        }
    }

    async fn record_seconds(studio: &mut Studio, events: &mut StudioEvents, seconds: u64) {
        studio.start_or_resume().await;
        for _ in 0..seconds {
            tokio::time::sleep(Duration::from_secs(1)).await;
            studio.tick();
        }
        assert!(studio.stop());
        finish(studio, events).await;
    }

    #[tokio::test(start_paused = true)]
    async fn audio_take_lands_in_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, mut events) =
            studio(SyntheticDevices::new(), MediaKind::Audio, dir.path());

        studio.start_or_resume().await;
        assert_eq!(studio.phase(), Phase::Recording);
        assert_eq!(
            studio.stream().map(|s| s.track_kinds()),
            Some(vec![TrackKind::Audio])
        );

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            studio.tick();
        }
        assert_eq!(studio.timer().seconds(), 3);

        assert!(studio.stop());
        assert_eq!(studio.phase(), Phase::Stopped);
        finish(&mut studio, &mut events).await;

        assert_eq!(studio.store().len(), 1);
        let take = studio.current().unwrap();
        assert_eq!(take.duration_seconds, 3);
        assert_eq!(take.kind, MediaKind::Audio);
        assert!(!take.media.is_empty());
        assert_eq!(take.media.format().mime(), "audio/wav");
        assert_eq!(&take.media.bytes()[..4], b"RIFF");
        assert!(studio.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn denied_camera_leaves_everything_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, mut events) = studio(
            SyntheticDevices::denying("Permission denied by user"),
            MediaKind::Video,
            dir.path(),
        );

        studio.start_or_resume().await;

        assert_eq!(studio.phase(), Phase::Idle);
        assert!(studio.store().is_empty());
        assert!(studio.stream().is_none());
        assert_eq!(
            studio.error(),
            Some("Camera/microphone access denied: Permission denied by user")
        );
        assert!(events.recorder.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn mode_switch_is_refused_while_recording() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, _events) = studio(SyntheticDevices::new(), MediaKind::Audio, dir.path());

        studio.start_or_resume().await;
        assert!(!studio.switch_mode(MediaKind::Video));
        assert_eq!(studio.phase(), Phase::Recording);
        assert_eq!(studio.mode(), MediaKind::Audio);

        studio.pause();
        assert!(!studio.switch_mode(MediaKind::Video));
        assert_eq!(studio.phase(), Phase::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_mode_releases_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, mut events) =
            studio(SyntheticDevices::new(), MediaKind::Audio, dir.path());
        record_seconds(&mut studio, &mut events, 1).await;
        assert!(studio.stream().is_some());

        assert!(studio.switch_mode(MediaKind::Video));
        assert!(studio.stream().is_none());
        assert!(studio.current().is_none());
        assert_eq!(studio.phase(), Phase::Idle);
        assert_eq!(studio.timer().seconds(), 0);
        assert_eq!(studio.store().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_before_flush_keeps_the_stopped_take() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, mut events) =
            studio(SyntheticDevices::new(), MediaKind::Audio, dir.path());

        studio.start_or_resume().await;
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            studio.tick();
        }
        assert!(studio.stop());

        // the encoder has not reported back yet
        studio.start_or_resume().await;
        assert_eq!(studio.phase(), Phase::Stopped);
        assert!(!studio.switch_mode(MediaKind::Video));
        assert_eq!(studio.mode(), MediaKind::Audio);

        finish(&mut studio, &mut events).await;
        assert_eq!(studio.store().len(), 1);
        assert_eq!(studio.current().unwrap().duration_seconds, 3);
        assert!(!studio.recorder().is_flushing());

        studio.start_or_resume().await;
        assert_eq!(studio.phase(), Phase::Recording);
        assert_eq!(studio.store().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn video_without_ffmpeg_reports_encoder_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, _events) = studio(SyntheticDevices::new(), MediaKind::Video, dir.path());

        studio.start_or_resume().await;
        assert_eq!(studio.phase(), Phase::Idle);
        assert_eq!(
            studio.error(),
            Some("Failed to start recording: no supported video recording format")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn paused_seconds_are_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, mut events) =
            studio(SyntheticDevices::new(), MediaKind::Audio, dir.path());

        studio.start_or_resume().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        studio.tick();
        studio.toggle_pause().await;
        for _ in 0..2 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            studio.tick();
        }
        studio.toggle_pause().await;
        assert_eq!(studio.phase(), Phase::Recording);
        tokio::time::sleep(Duration::from_secs(1)).await;
        studio.tick();
        studio.stop();
        finish(&mut studio, &mut events).await;

        assert_eq!(studio.current().unwrap().duration_seconds, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn new_take_clears_the_previous_one_but_keeps_the_list() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, mut events) =
            studio(SyntheticDevices::new(), MediaKind::Audio, dir.path());

        record_seconds(&mut studio, &mut events, 1).await;
        let first = studio.current().unwrap().id;

        studio.start_or_resume().await;
        assert!(studio.current().is_none());
        assert!(!studio.recorder().has_recording());
        assert_eq!(studio.timer().seconds(), 0);
        studio.stop();
        finish(&mut studio, &mut events).await;

        let ids: Vec<_> = studio.store().iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], first);
        assert_eq!(studio.current().map(|r| r.id), Some(ids[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_the_current_recording_clears_selection() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, mut events) =
            studio(SyntheticDevices::new(), MediaKind::Audio, dir.path());
        record_seconds(&mut studio, &mut events, 1).await;
        let first = studio.current().unwrap().id;
        record_seconds(&mut studio, &mut events, 1).await;
        let second = studio.current().unwrap().id;

        assert!(studio.delete(first));
        assert_eq!(studio.current().map(|r| r.id), Some(second));
        assert!(!studio.delete(first));

        studio.delete_current();
        assert!(studio.current().is_none());
        assert!(studio.store().is_empty());
        assert!(!studio.recorder().has_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn export_writes_into_output_dir_and_journal() {
        let dir = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let (mut studio, mut events) = Studio::new(
            Box::new(SyntheticDevices::new()),
            Box::new(PlatformEncoders::wav_only()),
            settings(MediaKind::Audio, dir.path(), Some(Journal::new(data.path()))),
        );
        record_seconds(&mut studio, &mut events, 2).await;
        let take = studio.current().unwrap().clone();

        let path = studio.export_take().unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), take.media.bytes());
        assert!(studio.notice().unwrap().starts_with("Saved "));

        studio.delete(take.id);
        let entries = Journal::new(data.path()).entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].duration_seconds, 2);
        assert!(entries[0].deleted);
        assert_eq!(
            entries[0].exported_to.as_deref(),
            Some(path.display().to_string().as_str())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn selecting_makes_a_recording_current() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, mut events) =
            studio(SyntheticDevices::new(), MediaKind::Audio, dir.path());
        record_seconds(&mut studio, &mut events, 1).await;
        let first = studio.current().unwrap().id;
        record_seconds(&mut studio, &mut events, 1).await;

        assert_eq!(studio.select(first).map(|r| r.id), Some(first));
        assert_eq!(studio.current().map(|r| r.id), Some(first));
        assert!(studio.select(RecordingId::new()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn capture_loss_stops_the_recording() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, _events) = studio(SyntheticDevices::new(), MediaKind::Audio, dir.path());
        studio.start_or_resume().await;
        let stream_id = studio.stream().unwrap().id().to_string();

        studio.handle_stream_event(StreamEvent::TrackEnded {
            stream_id,
            track: TrackKind::Audio,
            reason: "microphone unplugged".to_string(),
        });

        assert_eq!(studio.phase(), Phase::Stopped);
        assert!(studio.stream().is_none());
        assert_eq!(studio.notice(), Some("Capture ended: microphone unplugged"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, mut events) =
            studio(SyntheticDevices::new(), MediaKind::Audio, dir.path());
        record_seconds(&mut studio, &mut events, 1).await;
        studio.start_or_resume().await;

        studio.shutdown();
        assert_eq!(studio.phase(), Phase::Idle);
        assert!(studio.stream().is_none());
        assert!(studio.store().is_empty());
    }
}
