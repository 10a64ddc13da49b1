//! Elapsed-time counter for the recording display.
//!
//! The timer does not own a clock. The event loop delivers one `tick()` per
//! second from a `tokio::time::interval`, and the timer only counts it while
//! active, so a paused timer is unaffected by ticks that arrive meanwhile.

/// Whole-second counter with start/pause/reset controls.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Timer {
    seconds: u64,
    active: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins counting. Calling it while already active has no effect.
    pub fn start(&mut self) {
        if !self.active {
            self.active = true;
            tracing::trace!("Timer started at {}s", self.seconds);
        }
    }

    /// Halts counting and keeps the current value.
    pub fn pause(&mut self) {
        self.active = false;
    }

    /// Zeroes the counter and halts it.
    pub fn reset(&mut self) {
        self.seconds = 0;
        self.active = false;
    }

    /// Applies one periodic tick. Returns whether the counter advanced.
    pub fn tick(&mut self) -> bool {
        if self.active {
            self.seconds += 1;
        }
        self.active
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Formats the value as `m:ss`, or `h:mm:ss` from the first hour on.
    pub fn format_clock(&self) -> String {
        format_clock(self.seconds)
    }
}

/// Formats a duration in whole seconds the way the recording display shows it.
pub fn format_clock(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
