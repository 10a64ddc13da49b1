//! Native WAV encoder.
//!
//! Writes 16-bit PCM in a RIFF container without external tools. The header
//! is written up front with open-ended sizes (hound's streaming header), so
//! concatenating the emitted chunks always yields a playable file.

use super::encoder::{EncoderCommand, EncoderHandle, EventSink};
use crate::capture::{AudioSettings, MediaFrame};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};

pub struct WavEncoder {
    frames: mpsc::UnboundedReceiver<MediaFrame>,
    commands: mpsc::UnboundedReceiver<EncoderCommand>,
    timeslice: Duration,
    sink: EventSink,
    pending: Vec<u8>,
    paused: bool,
}

impl WavEncoder {
    /// Starts encoding `frames` on a background task.
    pub fn spawn(
        frames: mpsc::UnboundedReceiver<MediaFrame>,
        settings: AudioSettings,
        timeslice: Duration,
        sink: EventSink,
    ) -> EncoderHandle {
        let (tx, commands) = mpsc::unbounded_channel();
        let encoder = Self {
            frames,
            commands,
            timeslice,
            sink,
            pending: wav_header(settings),
            paused: false,
        };

        tracing::debug!(
            "WAV encoder started: {} Hz, {} channel(s)",
            settings.sample_rate,
            settings.channels
        );
        tokio::spawn(encoder.run());
        EncoderHandle::new(tx)
    }

    async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.timeslice, self.timeslice);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(EncoderCommand::Pause) => self.paused = true,
                    Some(EncoderCommand::Resume) => self.paused = false,
                    Some(EncoderCommand::Stop) | None => break,
                },
                frame = self.frames.recv() => match frame {
                    Some(frame) => self.write(&frame),
                    None => {
                        tracing::info!("Capture ended, finishing WAV recording");
                        break;
                    }
                },
                _ = ticker.tick() => self.flush(),
            }
        }

        // Frames captured before the stop request still belong to the recording.
        while let Ok(frame) = self.frames.try_recv() {
            self.write(&frame);
        }
        self.flush();
        self.sink.finished();
        tracing::debug!("WAV encoder finished attempt {}", self.sink.attempt());
    }

    fn write(&mut self, frame: &MediaFrame) {
        if self.paused {
            return;
        }
        if let MediaFrame::Audio(samples) = frame {
            self.pending.reserve(samples.len() * 2);
            for sample in samples.iter() {
                self.pending.extend_from_slice(&sample.to_le_bytes());
            }
        }
    }

    fn flush(&mut self) {
        self.sink.data(std::mem::take(&mut self.pending));
    }
}

fn wav_header(settings: AudioSettings) -> Vec<u8> {
    hound::WavSpec {
        channels: settings.channels,
        sample_rate: settings.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
    .into_header_for_infinite_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameHub;
    use crate::recording::encoder::{EventKind, MediaEncoder, RecorderEvent};
    use std::sync::Arc;

    const SETTINGS: AudioSettings = AudioSettings {
        sample_rate: 16000,
        channels: 1,
    };

    async fn collect(rx: &mut mpsc::UnboundedReceiver<RecorderEvent>) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(event) = rx.recv().await {
            match event.kind {
                EventKind::Data(bytes) => chunks.push(bytes),
                EventKind::Finished => return chunks,
                EventKind::Failed(e) => panic!("encoder failed: {e}"),
            }
        }
        panic!("event channel closed before Finished");
    }

    fn audio(samples: &[i16]) -> MediaFrame {
        MediaFrame::Audio(Arc::from(samples.to_vec()))
    }

    #[tokio::test(start_paused = true)]
    async fn emits_header_then_samples_until_stopped() {
        let hub = FrameHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut encoder = WavEncoder::spawn(
            hub.subscribe(),
            SETTINGS,
            Duration::from_secs(1),
            EventSink::new(1, tx),
        );

        hub.publish(audio(&[1, 2]));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        hub.publish(audio(&[-1]));
        encoder.stop();

        let chunks = collect(&mut rx).await;
        assert_eq!(chunks.len(), 2);

        let header = wav_header(SETTINGS);
        assert_eq!(&chunks[0][..4], b"RIFF");
        assert_eq!(&chunks[0][8..12], b"WAVE");
        assert_eq!(&chunks[0][header.len()..], &[1, 0, 2, 0]);
        assert_eq!(chunks[1], vec![0xff, 0xff]);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_input_is_left_out() {
        let hub = FrameHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut encoder = WavEncoder::spawn(
            hub.subscribe(),
            SETTINGS,
            Duration::from_secs(1),
            EventSink::new(3, tx),
        );

        encoder.pause();
        hub.publish(audio(&[5]));
        tokio::task::yield_now().await;
        encoder.resume();
        hub.publish(audio(&[6]));
        encoder.stop();

        let bytes: Vec<u8> = collect(&mut rx).await.concat();
        let header = wav_header(SETTINGS);
        assert_eq!(&bytes[header.len()..], &[6, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_end_finishes_the_recording() {
        let hub = FrameHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _encoder = WavEncoder::spawn(
            hub.subscribe(),
            SETTINGS,
            Duration::from_secs(1),
            EventSink::new(1, tx),
        );

        hub.publish(audio(&[9]));
        hub.close();

        let bytes: Vec<u8> = collect(&mut rx).await.concat();
        assert_eq!(bytes.len(), wav_header(SETTINGS).len() + 2);
    }
}
