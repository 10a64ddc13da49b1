//! Error types surfaced by the capture and recording components.
//!
//! These are caught at the `Studio` boundary and turned into a single
//! human-readable message for the TUI. Guarded no-op transitions are not
//! errors and never appear here.

use crate::capture::MediaKind;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to obtain a capture stream from the host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The user or the platform refused access to the input device.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// No device matching the request exists or it could not be opened.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A stream of another kind is still live and must be released first.
    #[error("Cannot acquire {requested} capture while {live} capture is live")]
    ModeLocked { live: MediaKind, requested: MediaKind },
}

impl CaptureError {
    /// Message shown to the user in the error banner.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied(cause) | Self::DeviceUnavailable(cause) => {
                format!("Camera/microphone access denied: {cause}")
            }
            Self::ModeLocked { .. } => self.to_string(),
        }
    }
}

/// Failure to start a recording attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("Capture stream is not active")]
    StreamInactive,

    /// No supported recording format, or the encoder could not be built.
    #[error("Failed to start recording: {0}")]
    EncoderInit(String),
}

/// Failure to write a recording out of the session.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_message_names_the_cause() {
        let err = CaptureError::PermissionDenied("user dismissed the prompt".to_string());
        assert_eq!(
            err.user_message(),
            "Camera/microphone access denied: user dismissed the prompt"
        );
    }

    #[test]
    fn mode_locked_message() {
        let err = CaptureError::ModeLocked {
            live: MediaKind::Audio,
            requested: MediaKind::Video,
        };
        assert_eq!(
            err.user_message(),
            "Cannot acquire video capture while audio capture is live"
        );
    }
}
