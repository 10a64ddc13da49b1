//! Input level meter for the live preview.
//!
//! Converts the RMS of the most recent 50 ms of samples to dBFS and maps the
//! 40 dB window below the configured reference level onto 0-100%. The
//! loudest level of the last three seconds is held for the peak readout.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const PEAK_HOLD: Duration = Duration::from_secs(3);
const HISTORY_INTERVAL: Duration = Duration::from_millis(50);
const FLOOR_PERCENT: f32 = 4.0;

/// Level in percent of the trailing 50 ms of `samples`.
pub fn level_percent(samples: &[i16], sample_rate: u32, reference_level_db: i8) -> u8 {
    if samples.is_empty() {
        return 0;
    }

    let window = ((sample_rate / 20) as usize).clamp(1, samples.len());
    let recent = &samples[samples.len() - window..];

    let sum_of_squares: i64 = recent.iter().map(|&x| (x as i64).pow(2)).sum();
    let rms = ((sum_of_squares / recent.len() as i64) as f32).sqrt();

    let db_fs = if rms > 0.0 {
        20.0 * (rms / 32767.0).log10()
    } else {
        -160.0
    };

    let min_db = reference_level_db as f32 - 40.0;
    ((db_fs - min_db) / 40.0 * 100.0).clamp(FLOOR_PERCENT, 100.0) as u8
}

/// Rolling level history plus a held peak.
#[derive(Debug)]
pub struct LevelMeter {
    reference_level_db: i8,
    history: VecDeque<u64>,
    capacity: usize,
    level: u8,
    peak: u8,
    peak_at: Instant,
    last_push: Option<Instant>,
}

impl LevelMeter {
    pub fn new(reference_level_db: i8) -> Self {
        Self {
            reference_level_db,
            history: VecDeque::new(),
            capacity: 0,
            level: 0,
            peak: 0,
            peak_at: Instant::now(),
            last_push: None,
        }
    }

    /// Feeds a block of captured samples observed at `now`.
    pub fn observe(&mut self, samples: &[i16], sample_rate: u32, now: Instant) {
        let level = level_percent(samples, sample_rate, self.reference_level_db);
        self.level = level;

        if level > self.peak || now.duration_since(self.peak_at) >= PEAK_HOLD {
            self.peak = level;
            self.peak_at = now;
        }

        let due = self
            .last_push
            .map_or(true, |at| now.duration_since(at) >= HISTORY_INTERVAL);
        if due {
            self.history.push_back(level as u64);
            self.last_push = Some(now);
            self.trim();
        }
    }

    /// Resizes the history to the display width, padding with silence on the left.
    pub fn set_width(&mut self, width: usize) {
        self.capacity = width;
        while self.history.len() < width {
            self.history.push_front(0);
        }
        self.trim();
    }

    /// Drops all readings, e.g. when the stream goes away.
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|v| *v = 0);
        self.level = 0;
        self.peak = 0;
    }

    fn trim(&mut self) {
        while self.capacity > 0 && self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn peak(&self) -> u8 {
        self.peak
    }

    /// Oldest-first history for a sparkline.
    pub fn history(&self) -> Vec<u64> {
        self.history.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_reads_as_the_floor() {
        assert_eq!(level_percent(&[0; 800], 16_000, -20), 4);
        assert_eq!(level_percent(&[], 16_000, -20), 0);
    }

    #[test]
    fn full_scale_saturates() {
        let loud = [i16::MAX; 800];
        assert_eq!(level_percent(&loud, 16_000, -20), 100);
    }

    #[test]
    fn reference_level_sits_at_full_scale() {
        // -20 dBFS is 10% of full scale
        let samples = [3277i16; 800];
        let level = level_percent(&samples, 16_000, -20);
        assert!((99..=100).contains(&level), "level {level}");
        assert!(level_percent(&samples, 16_000, -10) < level);
    }

    #[test]
    fn only_the_last_fifty_ms_count() {
        let mut samples = vec![i16::MAX; 800];
        samples.extend(std::iter::repeat(0).take(800));
        assert_eq!(level_percent(&samples, 16_000, -20), 4);
    }

    #[test]
    fn peak_is_held_for_three_seconds() {
        let mut meter = LevelMeter::new(-20);
        let start = Instant::now();

        meter.observe(&[i16::MAX; 800], 16_000, start);
        meter.observe(&[0; 800], 16_000, start + Duration::from_secs(1));
        assert_eq!(meter.level(), 4);
        assert_eq!(meter.peak(), 100);

        meter.observe(&[0; 800], 16_000, start + Duration::from_secs(4));
        assert_eq!(meter.peak(), 4);
    }

    #[test]
    fn history_follows_width_and_interval() {
        let mut meter = LevelMeter::new(-20);
        meter.set_width(3);
        assert_eq!(meter.history(), vec![0, 0, 0]);

        let start = Instant::now();
        meter.observe(&[i16::MAX; 800], 16_000, start);
        meter.observe(&[i16::MAX; 800], 16_000, start + Duration::from_millis(10));
        assert_eq!(meter.history(), vec![0, 0, 100]);

        meter.observe(&[0; 800], 16_000, start + Duration::from_millis(60));
        assert_eq!(meter.history(), vec![0, 100, 4]);

        meter.set_width(5);
        assert_eq!(meter.history(), vec![0, 0, 0, 100, 4]);
    }
}
