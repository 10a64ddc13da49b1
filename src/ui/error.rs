//! Full-screen error display for fatal start-up problems.
//!
//! Used when the studio cannot run at all (unreadable config, no capture
//! backend). Errors during a session go to the studio's banner instead.

use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Paragraph, Wrap},
};
use std::io::{self, Stdout};
use std::time::Duration;

const ERROR_BG: Color = Color::Rgb(160, 20, 20);
const ERROR_FG: Color = Color::Rgb(255, 255, 255);

pub struct ErrorScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl ErrorScreen {
    /// # Errors
    /// - If the terminal cannot be put into raw mode or the alternate screen
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(ErrorScreen { terminal })
    }

    /// Shows `title` and `message` until any key is pressed.
    ///
    /// # Errors
    /// - If rendering or event polling fails
    pub fn show(&mut self, title: &str, message: &str) -> anyhow::Result<()> {
        loop {
            self.terminal.draw(|frame| render(frame, title, message))?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(_) = event::read()? {
                    break;
                }
            }
        }
        Ok(())
    }

    /// # Errors
    /// - If terminal mode cannot be restored
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for ErrorScreen {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Shows a fatal error full-screen, then restores the terminal.
///
/// Failures to draw are logged; the caller still has the original error.
pub fn report_fatal(title: &str, message: &str) {
    let shown = ErrorScreen::new().and_then(|mut screen| {
        screen.show(title, message)?;
        screen.cleanup()
    });
    if let Err(e) = shown {
        tracing::warn!("Could not display error screen: {}", e);
    }
}

fn render(frame: &mut Frame, title: &str, message: &str) {
    let area = frame.area();
    frame.render_widget(Block::default().style(Style::default().bg(ERROR_BG)), area);

    let [_, body, _] = Layout::horizontal([
        Constraint::Percentage(10),
        Constraint::Percentage(80),
        Constraint::Percentage(10),
    ])
    .areas(area);
    let [_, text_area] =
        Layout::vertical([Constraint::Percentage(35), Constraint::Min(0)]).areas(body);

    let text = vec![
        Line::styled(title.to_string(), Style::default().bold()),
        Line::raw(""),
        Line::raw(message.to_string()),
        Line::raw(""),
        Line::styled("Press any key to exit", Style::default().italic()),
    ];
    let paragraph = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(ERROR_FG).bg(ERROR_BG));
    frame.render_widget(paragraph, text_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    #[test]
    fn renders_title_and_message() {
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        terminal
            .draw(|frame| render(frame, "Configuration error", "bad timeslice"))
            .unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = (0..buffer.area.height)
            .flat_map(|y| (0..buffer.area.width).map(move |x| (x, y)))
            .map(|pos| buffer[pos].symbol().to_string())
            .collect();
        assert!(text.contains("Configuration error"));
        assert!(text.contains("bad timeslice"));
        assert_eq!(buffer[(0, 0)].bg, ERROR_BG);
    }
}
