//! Exporting recordings to files.

use super::store::Recording;
use crate::error::ExportError;
use chrono::{SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// `<kind>-recording-<UTC timestamp>.<ext>`, with `:` and `.` in the
/// millisecond timestamp replaced by `-`.
pub fn export_filename(recording: &Recording) -> String {
    let timestamp = recording
        .created_at
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!(
        "{}-recording-{}.{}",
        recording.kind,
        timestamp,
        recording.media.format().extension()
    )
}

/// Writes the recording's bytes verbatim into `dir`.
///
/// An existing file is never overwritten; a numbered name is used instead,
/// the way browsers name repeated downloads.
///
/// # Errors
/// - `ExportError::Write` if the directory or file cannot be written
pub fn export(recording: &Recording, dir: &Path) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir).map_err(|source| ExportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let filename = export_filename(recording);
    let mut attempt = 0u32;
    loop {
        let path = dir.join(numbered(&filename, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(recording.media.bytes())
                    .and_then(|()| file.sync_all())
                    .map_err(|source| ExportError::Write {
                        path: path.clone(),
                        source,
                    })?;
                tracing::info!(
                    "Exported recording {} ({} bytes) to {}",
                    recording.id,
                    recording.media.len(),
                    path.display()
                );
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 100 => attempt += 1,
            Err(source) => return Err(ExportError::Write { path, source }),
        }
    }
}

fn numbered(filename: &str, attempt: u32) -> String {
    if attempt == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem} ({attempt}).{ext}"),
        None => format!("{filename} ({attempt})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MediaKind;
    use crate::recording::format::MediaFormat;
    use crate::recording::Media;
    use chrono::{Local, TimeZone};

    fn recording(kind: MediaKind, mime: &str, bytes: &[u8]) -> Recording {
        let media = Media::new(bytes.to_vec(), MediaFormat::parse(mime).unwrap());
        let mut recording = Recording::new(media, 4, kind);
        recording.created_at = Utc
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .unwrap()
            .with_timezone(&Local)
            + chrono::Duration::milliseconds(42);
        recording
    }

    #[test]
    fn filename_uses_kind_utc_millis_and_container() {
        let video = recording(MediaKind::Video, "video/webm;codecs=vp9", b"");
        assert_eq!(
            export_filename(&video),
            "video-recording-2024-03-09T14-05-07-042Z.webm"
        );

        let audio = recording(MediaKind::Audio, "audio/wav", b"");
        assert_eq!(
            export_filename(&audio),
            "audio-recording-2024-03-09T14-05-07-042Z.wav"
        );
    }

    #[test]
    fn export_writes_bytes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let take = recording(MediaKind::Audio, "audio/ogg;codecs=opus", b"OggS-payload");

        let path = export(&take, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), export_filename(&take).as_str());
        assert_eq!(std::fs::read(&path).unwrap(), b"OggS-payload");
    }

    #[test]
    fn repeated_exports_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let take = recording(MediaKind::Audio, "audio/wav", b"RIFF");

        let first = export(&take, dir.path()).unwrap();
        let second = export(&take, dir.path()).unwrap();
        assert_ne!(first, second);
        assert!(second
            .to_string_lossy()
            .ends_with("audio-recording-2024-03-09T14-05-07-042Z (1).wav"));
    }
}
