//! Terminal user interface for the studio.
//!
//! Shows the live input (level sparkline, or the camera picture in video
//! mode), the timer and phase, the current take, the session's recordings
//! and an error banner. Key presses are read on a helper thread and mapped
//! to [`Intent`]s for the event loop.

use super::meter::LevelMeter;
use super::preview::VideoPreview;
use super::recorder::Phase;
use crate::capture::{MediaFrame, MediaKind};
use crate::history::ui::format_size;
use crate::history::{Recording, RecordingId};
use crate::recording::timer::format_clock;
use crate::studio::Studio;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, HighlightSpacing, List, ListItem, ListState, Paragraph, Sparkline, Wrap},
};
use std::io::{stdout, Stdout};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const BG: Color = Color::Rgb(0, 0, 0);
const FG: Color = Color::Rgb(206, 224, 220);
const ACCENT: Color = Color::Rgb(185, 207, 212);
const DIM: Color = Color::Rgb(100, 100, 100);
const HIGHLIGHT_BG: Color = Color::Rgb(20, 20, 20);
const PEAK_WARNING: u8 = 90;

/// What a key press asks the studio to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Start a new take, or resume a paused one (`r`)
    Record,
    /// Pause or resume (space)
    TogglePause,
    /// Stop and save the take (`s`)
    Stop,
    /// Switch between audio and video capture (`m`)
    ToggleMode,
    SelectPrevious,
    SelectNext,
    /// Open the selected recording in the system player (enter)
    Play,
    /// Write the selected recording to the output directory (`d`)
    Export,
    /// Delete the selected recording (`x`)
    Delete,
    /// Delete the current take and discard it from the recorder (`X`)
    DiscardTake,
    /// Leave the studio (`q`, Esc, Ctrl+C)
    Quit,
}

/// Maps a key press to an intent. Releases and unknown keys map to nothing.
pub fn intent_for(key: &KeyEvent) -> Option<Intent> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    let intent = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Intent::Quit,
        KeyCode::Char('q') | KeyCode::Esc => Intent::Quit,
        KeyCode::Char('r') => Intent::Record,
        KeyCode::Char(' ') => Intent::TogglePause,
        KeyCode::Char('s') => Intent::Stop,
        KeyCode::Char('m') => Intent::ToggleMode,
        KeyCode::Up | KeyCode::Char('k') => Intent::SelectPrevious,
        KeyCode::Down | KeyCode::Char('j') => Intent::SelectNext,
        KeyCode::Enter => Intent::Play,
        KeyCode::Char('d') => Intent::Export,
        KeyCode::Char('x') | KeyCode::Delete => Intent::Delete,
        KeyCode::Char('X') => Intent::DiscardTake,
        _ => return None,
    };
    tracing::debug!("Key {:?} mapped to {:?}", key.code, intent);
    Some(intent)
}

/// Reads terminal key presses on a helper thread.
///
/// The thread exits once the receiver is dropped.
pub fn spawn_key_reader() -> mpsc::UnboundedReceiver<KeyEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while !tx.is_closed() {
            match event::poll(Duration::from_millis(50)) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) => {
                        if tx.send(key).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Failed to read terminal event: {}", e);
                        break;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("Failed to poll terminal events: {}", e);
                    break;
                }
            }
        }
        tracing::debug!("Key reader stopped");
    });
    rx
}

/// Display state that lives outside the studio: meter, preview and list selection.
pub struct StudioView {
    meter: LevelMeter,
    preview: VideoPreview,
    video_frames: u64,
    list_state: ListState,
    selected: Option<RecordingId>,
    followed: Option<RecordingId>,
}

impl StudioView {
    pub fn new(reference_level_db: i8) -> Self {
        Self {
            meter: LevelMeter::new(reference_level_db),
            preview: VideoPreview::new(),
            video_frames: 0,
            list_state: ListState::default(),
            selected: None,
            followed: None,
        }
    }

    /// Feeds one captured frame into the meter or the preview.
    pub fn observe(&mut self, studio: &Studio, frame: &MediaFrame) {
        let Some(stream) = studio.stream() else {
            return;
        };
        match frame {
            MediaFrame::Audio(samples) => {
                if let Some(audio) = stream.audio_settings() {
                    let rate = audio.sample_rate * audio.channels as u32;
                    self.meter.observe(samples, rate, Instant::now());
                }
            }
            MediaFrame::Video(pixels) => {
                if let Some(video) = stream.video_settings() {
                    self.video_frames += 1;
                    self.preview.update(video, pixels.clone());
                }
            }
        }
    }

    /// Forgets the live input, e.g. after the stream was released.
    pub fn reset_input(&mut self) {
        self.meter.reset();
        self.preview.clear();
        self.video_frames = 0;
    }

    /// The recording the list cursor is on.
    pub fn selected(&self) -> Option<RecordingId> {
        self.selected
    }

    pub fn select_previous(&mut self, studio: &Studio) {
        self.step(studio, -1);
    }

    pub fn select_next(&mut self, studio: &Studio) {
        self.step(studio, 1);
    }

    fn step(&mut self, studio: &Studio, delta: isize) {
        let store = studio.store();
        if store.is_empty() {
            return;
        }
        let index = match self.selected.and_then(|id| store.position(id)) {
            Some(index) => index.saturating_add_signed(delta).min(store.len() - 1),
            None => 0,
        };
        self.selected = store.iter().nth(index).map(|r| r.id);
    }

    /// Moves the cursor onto a newly saved take and off deleted entries.
    pub fn sync(&mut self, studio: &Studio) {
        let current = studio.current().map(|r| r.id);
        if current.is_some() && current != self.followed {
            self.selected = current;
        }
        self.followed = current;

        let store = studio.store();
        if self.selected.and_then(|id| store.position(id)).is_none() {
            self.selected = store.iter().next().map(|r| r.id);
        }
        self.list_state
            .select(self.selected.and_then(|id| store.position(id)));
    }
}

/// Full-screen studio renderer.
pub struct StudioTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl StudioTui {
    /// Enters raw mode and the alternate screen.
    ///
    /// # Errors
    /// - If the terminal cannot be initialized
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    /// Renders one frame.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn draw(&mut self, studio: &Studio, view: &mut StudioView) -> anyhow::Result<()> {
        view.sync(studio);
        self.terminal.draw(|frame| render(frame, studio, view))?;
        Ok(())
    }

    /// Leaves the alternate screen and restores the cursor.
    ///
    /// # Errors
    /// - If terminal mode cannot be restored
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for StudioTui {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn render(frame: &mut Frame, studio: &Studio, view: &mut StudioView) {
    let area = frame.area();
    frame.render_widget(Block::default().style(Style::default().bg(BG).fg(FG)), area);

    let [header_area, body_area, banner_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    let [live_area, side_area] =
        Layout::horizontal([Constraint::Percentage(62), Constraint::Percentage(38)])
            .areas(body_area);
    let [current_area, list_area] =
        Layout::vertical([Constraint::Length(4), Constraint::Min(0)]).areas(side_area);

    frame.render_widget(Paragraph::new(header_line(studio)), header_area);
    render_live(frame, live_area, studio, view);
    render_current(frame, current_area, studio.current());
    render_list(frame, list_area, studio, view);
    render_banner(frame, banner_area, studio);

    let help = Paragraph::new(
        "r record  space pause  s stop  m mode  ↑↓ select  enter play  d export  x delete  q quit",
    )
    .alignment(Alignment::Center)
    .style(Style::default().fg(DIM));
    frame.render_widget(help, footer_area);
}

fn header_line(studio: &Studio) -> Line<'static> {
    let indicator = match studio.phase() {
        Phase::Recording => Span::styled("● ", Style::default().fg(Color::Red)),
        Phase::Paused => Span::styled("⏸ ", Style::default().fg(Color::Yellow)),
        Phase::Stopped => Span::styled("■ ", Style::default().fg(ACCENT)),
        Phase::Idle => Span::styled("○ ", Style::default().fg(DIM)),
    };

    let mut spans = vec![
        Span::styled(" tapedeck  ", Style::default().fg(ACCENT).bold()),
        indicator,
        Span::raw(if studio.recorder().is_flushing() {
            "Saving"
        } else {
            studio.phase().label()
        }),
        Span::raw("  "),
        Span::styled(studio.timer().format_clock(), Style::default().bold()),
        Span::raw(format!("  mode: {}", studio.mode())),
    ];
    if let Some(format) = studio.recorder().format() {
        spans.push(Span::styled(format!("  {format}"), Style::default().fg(DIM)));
    }
    Line::from(spans)
}

fn render_live(frame: &mut Frame, area: Rect, studio: &Studio, view: &mut StudioView) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Live {} ", studio.mode()));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(stream) = studio.stream() else {
        let idle = Paragraph::new("No live input. Press r to record.")
            .alignment(Alignment::Center)
            .style(Style::default().fg(DIM));
        frame.render_widget(idle, centered_row(inner));
        return;
    };

    let [picture_area, meter_area, status_area] = match studio.mode() {
        MediaKind::Video => Layout::vertical([
            Constraint::Min(0),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(inner),
        MediaKind::Audio => Layout::vertical([
            Constraint::Length(0),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .areas(inner),
    };

    if studio.mode() == MediaKind::Video {
        frame.render_widget(&view.preview, picture_area);
    }

    view.meter.set_width(meter_area.width as usize);
    let paused = studio.phase() == Phase::Paused;
    let history = view.meter.history();
    let sparkline = Sparkline::default()
        .data(&history)
        .max(100)
        .style(Style::default().fg(if paused { DIM } else { FG }));
    frame.render_widget(sparkline, meter_area);

    let (level, peak) = if paused {
        (0, 0)
    } else {
        (view.meter.level(), view.meter.peak())
    };
    let peak_style = if peak >= PEAK_WARNING {
        Style::default().bg(Color::Red).fg(Color::White)
    } else {
        Style::default()
    };
    let mut status = vec![
        Span::raw(format!("level {level}% / peak ")),
        Span::styled(format!("{peak}%"), peak_style),
    ];
    if let Some(video) = stream.video_settings() {
        status.push(Span::styled(
            format!(
                "  {}x{} @ {} fps  frame {}",
                video.width, video.height, video.frame_rate, view.video_frames
            ),
            Style::default().fg(DIM),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(status)), status_area);
}

fn render_current(frame: &mut Frame, area: Rect, current: Option<&Recording>) {
    let block = Block::default().borders(Borders::ALL).title(" Current take ");
    let text = match current {
        Some(recording) => Line::from(recording_summary(recording)),
        None => Line::styled("Nothing recorded yet", Style::default().fg(DIM)),
    };
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_list(frame: &mut Frame, area: Rect, studio: &Studio, view: &mut StudioView) {
    let current = studio.current().map(|r| r.id);
    let items: Vec<ListItem> = studio
        .store()
        .iter()
        .map(|recording| {
            let marker = if Some(recording.id) == current { "* " } else { "  " };
            ListItem::new(format!("{marker}{}", recording_summary(recording)))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Recordings ({}) ", studio.store().len())),
        )
        .highlight_style(Style::default().bg(HIGHLIGHT_BG).fg(ACCENT))
        .highlight_symbol("> ")
        .highlight_spacing(HighlightSpacing::Always);

    frame.render_stateful_widget(list, area, &mut view.list_state);
}

fn render_banner(frame: &mut Frame, area: Rect, studio: &Studio) {
    let banner = if let Some(error) = studio.error() {
        Paragraph::new(format!(" {error}"))
            .style(Style::default().bg(Color::Rgb(255, 0, 0)).fg(Color::White))
    } else if let Some(notice) = studio.notice() {
        Paragraph::new(format!(" {notice}")).style(Style::default().fg(ACCENT))
    } else {
        Paragraph::new(format!(" Exports go to {}", studio.output_dir().display()))
            .style(Style::default().fg(DIM))
    };
    frame.render_widget(banner.wrap(Wrap { trim: true }), area);
}

/// `kind m:ss  HH:MM:SS  size`
fn recording_summary(recording: &Recording) -> String {
    format!(
        "{} {}  {}  {}",
        recording.kind,
        format_clock(recording.duration_seconds),
        recording.created_at.format("%H:%M:%S"),
        format_size(recording.media.len() as u64)
    )
}

fn centered_row(area: Rect) -> Rect {
    Rect {
        y: area.y + area.height / 2,
        height: area.height.min(1),
        ..area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticDevices;
    use crate::recording::encoder::PlatformEncoders;
    use crate::recording::format::FormatPreferences;
    use crate::studio::StudioSettings;
    use ratatui::backend::TestBackend;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn studio(devices: SyntheticDevices, mode: MediaKind) -> Studio {
        let (studio, _events) = Studio::new(
            Box::new(devices),
            Box::new(PlatformEncoders::wav_only()),
            StudioSettings {
                mode,
                preferences: FormatPreferences::default(),
                timeslice: Duration::from_secs(1),
                output_dir: std::env::temp_dir(),
                journal: None,
            },
        );
        studio
    }

    fn screen(studio: &Studio, view: &mut StudioView) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        view.sync(studio);
        terminal.draw(|frame| render(frame, studio, view)).unwrap();
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn keys_map_to_intents() {
        assert_eq!(intent_for(&key(KeyCode::Char('r'))), Some(Intent::Record));
        assert_eq!(intent_for(&key(KeyCode::Char(' '))), Some(Intent::TogglePause));
        assert_eq!(intent_for(&key(KeyCode::Char('s'))), Some(Intent::Stop));
        assert_eq!(intent_for(&key(KeyCode::Char('m'))), Some(Intent::ToggleMode));
        assert_eq!(intent_for(&key(KeyCode::Up)), Some(Intent::SelectPrevious));
        assert_eq!(intent_for(&key(KeyCode::Down)), Some(Intent::SelectNext));
        assert_eq!(intent_for(&key(KeyCode::Enter)), Some(Intent::Play));
        assert_eq!(intent_for(&key(KeyCode::Char('d'))), Some(Intent::Export));
        assert_eq!(intent_for(&key(KeyCode::Char('x'))), Some(Intent::Delete));
        assert_eq!(intent_for(&key(KeyCode::Char('X'))), Some(Intent::DiscardTake));
        assert_eq!(intent_for(&key(KeyCode::Esc)), Some(Intent::Quit));
        assert_eq!(intent_for(&key(KeyCode::Char('z'))), None);
    }

    #[test]
    fn ctrl_c_quits_and_releases_are_ignored() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(intent_for(&ctrl_c), Some(Intent::Quit));

        let mut release = key(KeyCode::Char('r'));
        release.kind = KeyEventKind::Release;
        assert_eq!(intent_for(&release), None);
    }

    #[test]
    fn idle_screen_shows_ready_state() {
        let studio = studio(SyntheticDevices::new(), MediaKind::Audio);
        let mut view = StudioView::new(-20);
        let text = screen(&studio, &mut view);

        assert!(text.contains("Ready"));
        assert!(text.contains("0:00"));
        assert!(text.contains("mode: audio"));
        assert!(text.contains("No live input"));
        assert!(text.contains("Recordings (0)"));
        assert!(text.contains("Nothing recorded yet"));
    }

    #[tokio::test]
    async fn error_banner_shows_denied_access() {
        let mut studio = studio(SyntheticDevices::denying("blocked"), MediaKind::Video);
        studio.start_or_resume().await;

        let mut view = StudioView::new(-20);
        let text = screen(&studio, &mut view);
        assert!(text.contains("Camera/microphone access denied: blocked"));
        assert!(text.contains("mode: video"));
    }

    #[tokio::test]
    async fn recording_screen_shows_indicator_and_format() {
        let mut studio = studio(SyntheticDevices::new(), MediaKind::Audio);
        studio.start_or_resume().await;

        let mut view = StudioView::new(-20);
        let text = screen(&studio, &mut view);
        assert!(text.contains("● Recording"));
        assert!(text.contains("audio/wav"));
        assert!(text.contains("level"));
    }
}
