//! The interactive recording studio.
//!
//! Runs the single event loop that drives the studio: key presses, the
//! one-second timer, encoder and capture notifications, and preview frames.
//! SIGUSR1 stops the current recording from outside, e.g. from a hotkey
//! daemon.

use crate::capture::{HostDevices, MediaDevices, MediaFrame, MediaKind, SyntheticDevices};
use crate::config::TapedeckConfig;
use crate::history::{journal, Journal};
use crate::recording::{
    intent_for, spawn_key_reader, Intent, PlatformEncoders, StudioTui, StudioView,
};
use crate::studio::{Studio, StudioSettings};
use crate::ui::report_fatal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

const RENDER_INTERVAL: Duration = Duration::from_millis(50);
const CLOCK_INTERVAL: Duration = Duration::from_secs(1);

/// Frames of the live stream for the meter and preview.
struct PreviewFeed {
    stream_id: String,
    frames: Option<mpsc::UnboundedReceiver<MediaFrame>>,
}

impl PreviewFeed {
    async fn next(feed: &mut Option<PreviewFeed>) -> Option<MediaFrame> {
        match feed.as_mut().and_then(|f| f.frames.as_mut()) {
            Some(frames) => frames.recv().await,
            None => std::future::pending().await,
        }
    }
}

/// Keeps the preview subscription on whatever stream is live.
fn follow_stream(feed: &mut Option<PreviewFeed>, studio: &Studio, view: &mut StudioView) {
    match (studio.stream(), feed.as_ref()) {
        (Some(stream), Some(current)) if current.stream_id == stream.id() => {}
        (Some(stream), _) => {
            tracing::debug!("Preview following stream {}", stream.id());
            *feed = Some(PreviewFeed {
                stream_id: stream.id().to_string(),
                frames: Some(stream.subscribe()),
            });
            view.reset_input();
        }
        (None, Some(_)) => {
            *feed = None;
            view.reset_input();
        }
        (None, None) => {}
    }
}

/// Applies one intent. Returns `false` when the user asked to leave.
async fn apply(studio: &mut Studio, view: &mut StudioView, intent: Intent) -> bool {
    match intent {
        Intent::Record => studio.start_or_resume().await,
        Intent::TogglePause => studio.toggle_pause().await,
        Intent::Stop => {
            studio.stop();
        }
        Intent::ToggleMode => {
            let next = studio.mode().toggled();
            studio.switch_mode(next);
        }
        Intent::SelectPrevious => view.select_previous(studio),
        Intent::SelectNext => view.select_next(studio),
        Intent::Play => {
            if let Some(id) = view.selected() {
                studio.play(id);
            }
        }
        Intent::Export => {
            if let Some(id) = view.selected() {
                studio.export(id);
            }
        }
        Intent::Delete => {
            if let Some(id) = view.selected() {
                studio.delete(id);
            }
        }
        Intent::DiscardTake => studio.delete_current(),
        Intent::Quit => return false,
    }
    true
}

fn open_journal() -> Option<Journal> {
    match journal::data_dir() {
        Ok(dir) => Some(Journal::new(&dir)),
        Err(e) => {
            tracing::warn!("Recording journal disabled: {}", e);
            None
        }
    }
}

/// Runs the studio until the user quits.
///
/// `video` starts in video mode regardless of the configured default;
/// `synthetic` replaces the microphone and camera with generated test input.
///
/// # Errors
/// - If the configuration cannot be loaded (shown on an error screen first)
/// - If the terminal cannot be initialized
pub async fn handle_record(video: bool, synthetic: bool) -> anyhow::Result<()> {
    tracing::info!("=== tapedeck Studio Started ===");

    let config = match TapedeckConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err}");
            report_fatal(
                "Configuration error",
                &format!("{err}\n\nPlease check ~/.config/tapedeck/tapedeck.toml and try again."),
            );
            return Err(anyhow::anyhow!("Configuration error: {err}"));
        }
    };

    let mut settings = StudioSettings::from_config(&config, open_journal())?;
    if video {
        settings.mode = MediaKind::Video;
    }
    tracing::info!(
        "Configuration loaded: mode={}, audio device={}, camera={}, timeslice={}ms, output={}",
        settings.mode,
        config.audio.device,
        config.video.device,
        config.recording.timeslice_ms,
        settings.output_dir.display()
    );

    let devices: Box<dyn MediaDevices> = if synthetic {
        tracing::info!("Using synthetic capture devices");
        Box::new(SyntheticDevices::new())
    } else {
        Box::new(HostDevices::new(&config.audio, &config.video))
    };
    let (mut studio, mut events) =
        Studio::new(devices, Box::new(PlatformEncoders::detect()), settings);

    let stop_requested = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, stop_requested.clone())
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;

    let mut tui = StudioTui::new().map_err(|e| anyhow::anyhow!("Failed to initialize UI: {e}"))?;
    let mut view = StudioView::new(config.audio.reference_level_db);
    let mut keys = spawn_key_reader();
    let mut feed: Option<PreviewFeed> = None;

    let mut render = interval(RENDER_INTERVAL);
    render.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut clock = interval_at(Instant::now() + CLOCK_INTERVAL, CLOCK_INTERVAL);

    tracing::debug!("Entering studio loop");
    loop {
        follow_stream(&mut feed, &studio, &mut view);

        tokio::select! {
            key = keys.recv() => match key {
                Some(key) => {
                    if let Some(intent) = intent_for(&key) {
                        if !apply(&mut studio, &mut view, intent).await {
                            break;
                        }
                    }
                }
                None => {
                    tracing::error!("Keyboard input closed, leaving studio");
                    break;
                }
            },
            Some(event) = events.recorder.recv() => studio.handle_recorder_event(event),
            Some(event) = events.stream.recv() => studio.handle_stream_event(event),
            frame = PreviewFeed::next(&mut feed) => match frame {
                Some(frame) => view.observe(&studio, &frame),
                None => {
                    if let Some(feed) = feed.as_mut() {
                        feed.frames = None;
                    }
                }
            },
            _ = clock.tick() => studio.tick(),
            _ = render.tick() => {
                if stop_requested.swap(false, Ordering::Relaxed) {
                    tracing::info!("Received SIGUSR1: stopping recording");
                    studio.stop();
                }
                tui.draw(&studio, &mut view)?;
            }
        }
    }

    tracing::info!(
        "Leaving studio with {} recording(s) this session",
        studio.store().len()
    );
    studio.shutdown();
    drop(keys);
    tui.cleanup()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::format::FormatPreferences;
    use crate::recording::Phase;
    use crate::studio::StudioEvents;

    fn studio(dir: &std::path::Path) -> (Studio, StudioEvents) {
        Studio::new(
            Box::new(SyntheticDevices::new()),
            Box::new(PlatformEncoders::wav_only()),
            StudioSettings {
                mode: MediaKind::Audio,
                preferences: FormatPreferences::default(),
                timeslice: Duration::from_secs(1),
                output_dir: dir.to_path_buf(),
                journal: None,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn intents_drive_a_full_take() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, mut events) = studio(dir.path());
        let mut view = StudioView::new(-20);

        assert!(apply(&mut studio, &mut view, Intent::Record).await);
        assert_eq!(studio.phase(), Phase::Recording);
        assert!(apply(&mut studio, &mut view, Intent::TogglePause).await);
        assert_eq!(studio.phase(), Phase::Paused);
        assert!(apply(&mut studio, &mut view, Intent::Record).await);
        assert_eq!(studio.phase(), Phase::Recording);

        // mode switch is refused mid-take
        assert!(apply(&mut studio, &mut view, Intent::ToggleMode).await);
        assert_eq!(studio.mode(), MediaKind::Audio);

        assert!(apply(&mut studio, &mut view, Intent::Stop).await);
        while studio.current().is_none() {
            let event = events.recorder.recv().await.unwrap();
            studio.handle_recorder_event(event);
        }

        view.sync(&studio);
        assert_eq!(view.selected(), studio.current().map(|r| r.id));
        assert!(apply(&mut studio, &mut view, Intent::Export).await);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        assert!(apply(&mut studio, &mut view, Intent::Delete).await);
        assert!(studio.store().is_empty());
        assert!(!apply(&mut studio, &mut view, Intent::Quit).await);
    }

    #[tokio::test(start_paused = true)]
    async fn preview_follows_the_live_stream() {
        let dir = tempfile::tempdir().unwrap();
        let (mut studio, _events) = studio(dir.path());
        let mut view = StudioView::new(-20);
        let mut feed = None;

        follow_stream(&mut feed, &studio, &mut view);
        assert!(feed.is_none());

        studio.start_or_resume().await;
        follow_stream(&mut feed, &studio, &mut view);
        let stream_id = studio.stream().unwrap().id().to_string();
        assert_eq!(feed.as_ref().map(|f| f.stream_id.clone()), Some(stream_id));

        let frame = PreviewFeed::next(&mut feed).await;
        assert!(matches!(frame, Some(MediaFrame::Audio(_))));

        studio.stop();
        studio.switch_mode(MediaKind::Video);
        follow_stream(&mut feed, &studio, &mut view);
        assert!(feed.is_none());
    }
}
