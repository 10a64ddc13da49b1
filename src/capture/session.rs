//! Capture session: exclusive owner of the live input stream.

use super::stream::{Constraints, LiveStream, MediaDevices, StreamEvent};
use super::MediaKind;
use crate::error::CaptureError;
use tokio::sync::mpsc;

/// Owns at most one live stream and the mode it was acquired for.
///
/// The stream must be released before the mode can change; dropping the
/// session releases it as well so capture devices are never left open.
pub struct CaptureSession {
    devices: Box<dyn MediaDevices>,
    mode: MediaKind,
    stream: Option<LiveStream>,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
}

impl CaptureSession {
    /// Creates a session and the receiver for its track-ended signals.
    pub fn new(
        devices: Box<dyn MediaDevices>,
        mode: MediaKind,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                devices,
                mode,
                stream: None,
                events_tx,
            },
            events_rx,
        )
    }

    pub fn mode(&self) -> MediaKind {
        self.mode
    }

    pub fn stream(&self) -> Option<&LiveStream> {
        self.stream.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_active())
    }

    /// Requests a stream for `mode` from the host.
    ///
    /// Returns the live stream unchanged when one already exists for the
    /// same mode.
    ///
    /// # Errors
    /// - `ModeLocked` if a stream for the other mode is live
    /// - `PermissionDenied` / `DeviceUnavailable` from the host; no stream
    ///   exists afterwards
    pub async fn acquire(&mut self, mode: MediaKind) -> Result<&LiveStream, CaptureError> {
        if self.is_live() {
            if self.mode != mode {
                return Err(CaptureError::ModeLocked {
                    live: self.mode,
                    requested: mode,
                });
            }
        } else {
            self.stream = None;
            self.mode = mode;

            tracing::info!("Requesting {} capture", mode);
            let stream = self
                .devices
                .get_user_media(Constraints::for_kind(mode), self.events_tx.clone())
                .await
                .map_err(|e| {
                    tracing::warn!("Capture request for {} refused: {}", mode, e);
                    e
                })?;
            tracing::info!(
                "Capture stream {} acquired with tracks {:?}",
                stream.id(),
                stream.track_kinds()
            );
            self.stream = Some(stream);
        }

        self.stream
            .as_ref()
            .ok_or_else(|| CaptureError::DeviceUnavailable("stream vanished".to_string()))
    }

    /// Stops all tracks and frees the stream. Returns whether one was live.
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop();
                true
            }
            None => false,
        }
    }

    /// Changes the capture mode. Rejected while a stream is live.
    pub fn switch_mode(&mut self, mode: MediaKind) -> bool {
        if self.is_live() {
            tracing::debug!("Ignoring mode switch to {} while capture is live", mode);
            return false;
        }
        self.mode = mode;
        true
    }

    /// Applies a stream signal. Returns true when it ended the live stream.
    pub fn handle_event(&mut self, event: &StreamEvent) -> bool {
        match event {
            StreamEvent::TrackEnded {
                stream_id,
                track,
                reason,
            } => {
                let is_current = self.stream.as_ref().is_some_and(|s| s.id() == stream_id);
                if !is_current {
                    tracing::debug!("Ignoring track-ended signal for stale stream {}", stream_id);
                    return false;
                }
                tracing::warn!("{:?} track ended: {}", track, reason);
                self.release()
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SyntheticDevices, TrackKind};

    #[tokio::test]
    async fn acquire_audio_yields_audio_only_stream() {
        let (mut session, _events) =
            CaptureSession::new(Box::new(SyntheticDevices::new()), MediaKind::Audio);

        let stream = session.acquire(MediaKind::Audio).await.unwrap();
        assert_eq!(stream.track_kinds(), vec![TrackKind::Audio]);
        assert!(session.is_live());
    }

    #[tokio::test]
    async fn acquire_video_yields_both_tracks() {
        let (mut session, _events) =
            CaptureSession::new(Box::new(SyntheticDevices::new()), MediaKind::Video);

        let stream = session.acquire(MediaKind::Video).await.unwrap();
        assert_eq!(
            stream.track_kinds(),
            vec![TrackKind::Audio, TrackKind::Video]
        );
    }

    #[tokio::test]
    async fn acquire_is_reused_for_same_mode() {
        let (mut session, _events) =
            CaptureSession::new(Box::new(SyntheticDevices::new()), MediaKind::Audio);

        let first = session.acquire(MediaKind::Audio).await.unwrap().id().to_string();
        let second = session.acquire(MediaKind::Audio).await.unwrap().id().to_string();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn denied_permission_leaves_no_stream() {
        let (mut session, _events) = CaptureSession::new(
            Box::new(SyntheticDevices::denying("Permission dismissed")),
            MediaKind::Video,
        );

        let err = session.acquire(MediaKind::Video).await.unwrap_err();
        assert_eq!(
            err,
            CaptureError::PermissionDenied("Permission dismissed".to_string())
        );
        assert!(!session.is_live());
        assert!(session.stream().is_none());
    }

    #[tokio::test]
    async fn mode_is_locked_while_live() {
        let (mut session, _events) =
            CaptureSession::new(Box::new(SyntheticDevices::new()), MediaKind::Audio);
        session.acquire(MediaKind::Audio).await.unwrap();

        assert!(!session.switch_mode(MediaKind::Video));
        assert!(matches!(
            session.acquire(MediaKind::Video).await,
            Err(CaptureError::ModeLocked { .. })
        ));
        assert_eq!(session.mode(), MediaKind::Audio);

        assert!(session.release());
        assert!(!session.release());
        assert!(session.switch_mode(MediaKind::Video));
        assert_eq!(session.mode(), MediaKind::Video);
    }

    #[tokio::test]
    async fn track_ended_releases_current_stream_only() {
        let (mut session, _events) =
            CaptureSession::new(Box::new(SyntheticDevices::new()), MediaKind::Audio);
        let id = session.acquire(MediaKind::Audio).await.unwrap().id().to_string();

        let stale = StreamEvent::TrackEnded {
            stream_id: "other".to_string(),
            track: TrackKind::Audio,
            reason: "unplugged".to_string(),
        };
        assert!(!session.handle_event(&stale));
        assert!(session.is_live());

        let current = StreamEvent::TrackEnded {
            stream_id: id,
            track: TrackKind::Audio,
            reason: "unplugged".to_string(),
        };
        assert!(session.handle_event(&current));
        assert!(!session.is_live());
    }
}
