//! Interactive terminal UI for browsing the recording journal.
//!
//! Lists journaled recordings from past sessions with keyboard and mouse
//! navigation. Media from past sessions is not kept, so entries are
//! informational only.

use super::journal::JournalEntry;
use crate::recording::timer::format_clock;
use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, MouseEvent, MouseEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, HighlightSpacing, List, ListItem, ListState, Padding, Paragraph},
};
use std::io::{self, Stdout};
use std::time::Duration;

const BG: Color = Color::Rgb(0, 0, 0);
const FG: Color = Color::Rgb(255, 255, 255);
const TIMESTAMP_FG: Color = Color::Rgb(100, 100, 100);
const DELETED_FG: Color = Color::Rgb(90, 60, 60);
const HIGHLIGHT_BG: Color = Color::Rgb(20, 20, 20);
const HELP_FG: Color = Color::Rgb(100, 100, 100);

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Second line of a journal entry: duration, format, size and what became of it.
fn entry_summary(entry: &JournalEntry) -> String {
    let mut summary = format!(
        "{} {}  {}  {}",
        entry.kind,
        format_clock(entry.duration_seconds),
        entry.format,
        format_size(entry.size_bytes)
    );
    if let Some(path) = &entry.exported_to {
        summary.push_str(&format!("  -> {path}"));
    }
    if entry.deleted {
        summary.push_str("  (deleted)");
    }
    summary
}

/// Read-only viewer for journal entries.
pub struct JournalViewer {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    entries: Vec<JournalEntry>,
    list_state: ListState,
}

impl JournalViewer {
    pub fn new(entries: Vec<JournalEntry>) -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        let mut list_state = ListState::default();
        if !entries.is_empty() {
            list_state.select(Some(0));
        }

        Ok(Self {
            terminal,
            entries,
            list_state,
        })
    }

    /// Runs the viewer until the user exits.
    pub fn run(&mut self) -> Result<()> {
        tracing::debug!("Journal viewer started with {} entries", self.entries.len());

        loop {
            self.draw()?;

            if event::poll(Duration::from_millis(50))? {
                match event::read()? {
                    Event::Key(key) => match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Up => self.list_state.select_previous(),
                        KeyCode::Down => self.list_state.select_next(),
                        _ => {}
                    },
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    _ => {}
                }
            }
        }

        self.cleanup()
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.list_state.select_previous(),
            MouseEventKind::ScrollDown => self.list_state.select_next(),
            _ => {}
        }
    }

    fn draw(&mut self) -> Result<()> {
        let total = self.entries.len();

        self.terminal.draw(|frame| {
            let area = frame.area();

            let padding_block = Block::default()
                .padding(Padding::uniform(1))
                .style(Style::default().bg(BG));
            frame.render_widget(&padding_block, area);
            let padded_area = padding_block.inner(area);

            let [list_area, footer_area] =
                Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(padded_area);

            let items: Vec<ListItem> = self
                .entries
                .iter()
                .map(|entry| {
                    let timestamp = Line::styled(
                        entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        Style::default().fg(TIMESTAMP_FG),
                    );
                    let fg = if entry.deleted { DELETED_FG } else { FG };
                    let summary = Line::styled(entry_summary(entry), Style::default().fg(fg));
                    ListItem::new(vec![timestamp, summary])
                })
                .collect();

            let list = List::new(items)
                .block(
                    Block::default()
                        .title(format!(" Recording history ({total}) "))
                        .borders(Borders::ALL)
                        .padding(Padding::bottom(1)),
                )
                .style(Style::default().fg(FG))
                .highlight_style(Style::default().bg(HIGHLIGHT_BG))
                .highlight_symbol("> ")
                .highlight_spacing(HighlightSpacing::Always);

            frame.render_stateful_widget(list, list_area, &mut self.list_state);

            let help = Paragraph::new("↑↓ scroll, esc/q exit")
                .alignment(Alignment::Center)
                .style(Style::default().fg(HELP_FG));
            frame.render_widget(help, footer_area);
        })?;

        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        self.terminal.show_cursor()?;
        tracing::debug!("Journal viewer terminal cleanup complete");
        Ok(())
    }
}

impl Drop for JournalViewer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MediaKind;
    use chrono::Local;

    #[test]
    fn sizes_use_binary_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn summary_mentions_export_and_deletion() {
        let entry = JournalEntry {
            id: "x".to_string(),
            kind: MediaKind::Video,
            format: "video/webm".to_string(),
            created_at: Local::now(),
            duration_seconds: 65,
            size_bytes: 2048,
            exported_to: Some("/tmp/v.webm".to_string()),
            deleted: true,
        };
        assert_eq!(
            entry_summary(&entry),
            "video 1:05  video/webm  2.0 KB  -> /tmp/v.webm  (deleted)"
        );
    }
}
