//! Live camera preview drawn with half-block characters.
//!
//! Each terminal cell shows two vertically stacked pixels: the upper one as
//! the foreground colour of `▀`, the lower one as the background.

use crate::capture::VideoSettings;
use ratatui::{buffer::Buffer, layout::Rect, style::Color, widgets::Widget};
use std::sync::Arc;

/// Latest RGB24 frame of the live stream.
#[derive(Debug, Default, Clone)]
pub struct VideoPreview {
    settings: Option<VideoSettings>,
    frame: Option<Arc<[u8]>>,
}

impl VideoPreview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the shown frame. Frames that do not match `settings` are ignored.
    pub fn update(&mut self, settings: VideoSettings, frame: Arc<[u8]>) {
        if frame.len() != settings.frame_len() {
            tracing::trace!(
                "Dropping preview frame of {} bytes, expected {}",
                frame.len(),
                settings.frame_len()
            );
            return;
        }
        self.settings = Some(settings);
        self.frame = Some(frame);
    }

    pub fn clear(&mut self) {
        self.settings = None;
        self.frame = None;
    }

    pub fn has_frame(&self) -> bool {
        self.frame.is_some()
    }

    /// Colour of the frame pixel nearest to cell position `(col, row)` of a
    /// `width` x `height` pixel grid.
    fn sample(&self, col: u32, row: u32, width: u32, height: u32) -> Option<Color> {
        let settings = self.settings?;
        let frame = self.frame.as_ref()?;
        if width == 0 || height == 0 {
            return None;
        }
        let x = (col as u64 * settings.width as u64 / width as u64) as usize;
        let y = (row as u64 * settings.height as u64 / height as u64) as usize;
        let offset = (y * settings.width as usize + x) * 3;
        let pixel = frame.get(offset..offset + 3)?;
        Some(Color::Rgb(pixel[0], pixel[1], pixel[2]))
    }
}

impl Widget for &VideoPreview {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.is_empty() || self.frame.is_none() {
            return;
        }
        let width = area.width as u32;
        let height = area.height as u32 * 2;

        for row in 0..area.height {
            for col in 0..area.width {
                let top = self.sample(col as u32, row as u32 * 2, width, height);
                let bottom = self.sample(col as u32, row as u32 * 2 + 1, width, height);
                if let (Some(top), Some(bottom)) = (top, bottom) {
                    if let Some(cell) = buf.cell_mut((area.x + col, area.y + row)) {
                        cell.set_char('▀').set_fg(top).set_bg(bottom);
                    }
                }
            }
        }
    }
}
