//! Hands a recording to the system media player.
//!
//! Recordings live in memory, so the bytes are first written to a
//! session-scoped temporary directory that is removed when the studio exits.

use crate::history::{export_filename, Recording, RecordingId};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use tempfile::TempDir;

pub struct Playback {
    dir: Option<TempDir>,
    files: HashMap<RecordingId, PathBuf>,
}

impl Playback {
    pub fn new() -> Self {
        Self {
            dir: None,
            files: HashMap::new(),
        }
    }

    /// Writes the recording to the playback directory once and returns its path.
    ///
    /// # Errors
    /// - If the temporary directory or file cannot be created
    pub fn stage(&mut self, recording: &Recording) -> Result<PathBuf> {
        if let Some(path) = self.files.get(&recording.id) {
            return Ok(path.clone());
        }

        if self.dir.is_none() {
            self.dir = Some(
                tempfile::Builder::new()
                    .prefix("tapedeck-playback-")
                    .tempdir()?,
            );
        }
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| anyhow!("Playback directory unavailable"))?;

        // ids keep takes from the same millisecond apart
        let path = dir
            .path()
            .join(format!("{}-{}", recording.id, export_filename(recording)));
        std::fs::write(&path, recording.media.bytes())?;
        tracing::debug!("Staged recording {} at {}", recording.id, path.display());

        self.files.insert(recording.id, path.clone());
        Ok(path)
    }

    /// Drops the staged file of a deleted recording.
    pub fn forget(&mut self, id: RecordingId) {
        if let Some(path) = self.files.remove(&id) {
            let _ = std::fs::remove_file(path);
        }
    }

    /// Stages the recording and opens it without waiting for the player.
    ///
    /// # Errors
    /// - If staging fails
    /// - If no player could be started
    pub fn play(&mut self, recording: &Recording) -> Result<PathBuf> {
        let path = self.stage(recording)?;
        open_with_system_player(&path)?;
        tracing::info!("Playing recording {} from {}", recording.id, path.display());
        Ok(path)
    }
}

impl Default for Playback {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts `program` on `path` and reaps it on a helper thread once it exits.
fn spawn_detached(
    program: &str,
    path: &Path,
) -> std::io::Result<JoinHandle<std::io::Result<ExitStatus>>> {
    let mut child = Command::new(program)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(std::thread::spawn(move || child.wait()))
}

/// Opens `path` with the default application via `open`.
#[cfg(target_os = "macos")]
fn open_with_system_player(path: &Path) -> Result<()> {
    spawn_detached("open", path)
        .map(|_| ())
        .map_err(|e| anyhow!("Failed to open media player: {e}"))
}

/// Tries `xdg-open` first, then common players.
#[cfg(not(target_os = "macos"))]
fn open_with_system_player(path: &Path) -> Result<()> {
    if spawn_detached("xdg-open", path).is_ok() {
        return Ok(());
    }
    for player in ["mpv", "vlc", "ffplay"] {
        if spawn_detached(player, path).is_ok() {
            tracing::debug!("Opened playback with {}", player);
            return Ok(());
        }
    }
    Err(anyhow!("No media player found. Install mpv, vlc or ffplay"))
}
