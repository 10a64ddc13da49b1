//! Metadata journal of finished recordings, stored in SQLite.
//!
//! Media bytes are never written here; the journal only remembers what was
//! recorded, exported and deleted so past sessions can be reviewed with
//! `tapedeck history`.

use super::store::{Recording, RecordingId};
use crate::capture::MediaKind;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// One journaled recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub id: String,
    pub kind: MediaKind,
    pub format: String,
    pub created_at: DateTime<Local>,
    pub duration_seconds: u64,
    pub size_bytes: u64,
    pub exported_to: Option<String>,
    pub deleted: bool,
}

/// Directory holding the journal database.
///
/// # Errors
/// - If the home directory cannot be determined
pub fn data_dir() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow!("Could not determine home directory"))?
        .join(".local")
        .join("share")
        .join("tapedeck"))
}

pub struct Journal {
    database_path: PathBuf,
    connection: Option<Connection>,
}

impl Journal {
    /// Creates a journal stored in `data_dir`. The database is opened lazily.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            database_path: data_dir.join("recordings.db"),
            connection: None,
        }
    }

    /// Opens the database and creates the table if necessary.
    ///
    /// # Errors
    /// - If the data directory or database file cannot be created
    /// - If table creation fails
    fn get_connection(&mut self) -> Result<&Connection> {
        if self.connection.is_none() {
            if let Some(parent) = self.database_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let connection = Connection::open(&self.database_path)?;

            connection.execute(
                "CREATE TABLE IF NOT EXISTS recordings (
                    id TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    format TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    duration_seconds INTEGER NOT NULL,
                    size_bytes INTEGER NOT NULL,
                    exported_to TEXT,
                    deleted INTEGER NOT NULL DEFAULT 0
                )",
                [],
            )?;

            self.connection = Some(connection);
        }

        self.connection
            .as_ref()
            .ok_or_else(|| anyhow!("Journal connection unavailable"))
    }

    /// Records a newly saved recording.
    pub fn record(&mut self, recording: &Recording) -> Result<()> {
        let connection = self.get_connection()?;
        connection.execute(
            "INSERT OR REPLACE INTO recordings
                (id, kind, format, created_at, duration_seconds, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                recording.id.to_string(),
                recording.kind.as_str(),
                recording.media.format().mime(),
                recording.created_at.to_rfc3339(),
                recording.duration_seconds as i64,
                recording.media.len() as i64,
            ],
        )?;

        tracing::debug!("Recording {} journaled", recording.id);
        Ok(())
    }

    pub fn mark_exported(&mut self, id: RecordingId, path: &Path) -> Result<()> {
        let connection = self.get_connection()?;
        connection.execute(
            "UPDATE recordings SET exported_to = ?2 WHERE id = ?1",
            params![id.to_string(), path.display().to_string()],
        )?;
        Ok(())
    }

    pub fn mark_deleted(&mut self, id: RecordingId) -> Result<()> {
        let connection = self.get_connection()?;
        connection.execute(
            "UPDATE recordings SET deleted = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    /// All journaled recordings, most recent first.
    ///
    /// # Errors
    /// - If the query fails
    /// - If a stored timestamp or kind cannot be parsed
    pub fn entries(&mut self) -> Result<Vec<JournalEntry>> {
        let connection = self.get_connection()?;

        let mut statement = connection.prepare(
            "SELECT id, kind, format, created_at, duration_seconds, size_bytes, exported_to, deleted
             FROM recordings ORDER BY created_at DESC",
        )?;

        let entries = statement
            .query_map([], |row| {
                let kind_str = row.get::<_, String>(1)?;
                let kind = MediaKind::parse(&kind_str).ok_or_else(|| {
                    rusqlite::Error::InvalidParameterName(format!("Invalid kind '{kind_str}'"))
                })?;

                let timestamp_str = row.get::<_, String>(3)?;
                let created_at = DateTime::parse_from_rfc3339(&timestamp_str)
                    .map(|dt| dt.with_timezone(&Local))
                    .map_err(|_| {
                        rusqlite::Error::InvalidParameterName(
                            "Invalid timestamp format".to_string(),
                        )
                    })?;

                Ok(JournalEntry {
                    id: row.get(0)?,
                    kind,
                    format: row.get(2)?,
                    created_at,
                    duration_seconds: row.get::<_, i64>(4)?.max(0) as u64,
                    size_bytes: row.get::<_, i64>(5)?.max(0) as u64,
                    exported_to: row.get(6)?,
                    deleted: row.get::<_, i64>(7)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::format::MediaFormat;
    use crate::recording::Media;
    use chrono::Duration;

    fn recording(kind: MediaKind, mime: &str, seconds: u64) -> Recording {
        let media = Media::new(vec![0; 10], MediaFormat::parse(mime).unwrap());
        Recording::new(media, seconds, kind)
    }

    #[test]
    fn records_metadata_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::new(dir.path());

        let mut older = recording(MediaKind::Audio, "audio/wav", 3);
        older.created_at = older.created_at - Duration::minutes(5);
        let newer = recording(MediaKind::Video, "video/webm;codecs=vp9", 7);
        journal.record(&older).unwrap();
        journal.record(&newer).unwrap();

        let entries = journal.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, newer.id.to_string());
        assert_eq!(entries[0].kind, MediaKind::Video);
        assert_eq!(entries[0].format, "video/webm;codecs=vp9");
        assert_eq!(entries[0].duration_seconds, 7);
        assert_eq!(entries[1].size_bytes, 10);
        assert!(!entries[1].deleted);
    }

    #[test]
    fn marks_exports_and_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::new(&dir.path().join("nested"));
        let take = recording(MediaKind::Audio, "audio/ogg;codecs=opus", 1);
        journal.record(&take).unwrap();

        journal
            .mark_exported(take.id, Path::new("/tmp/audio-recording.ogg"))
            .unwrap();
        journal.mark_deleted(take.id).unwrap();

        let entry = &journal.entries().unwrap()[0];
        assert_eq!(entry.exported_to.as_deref(), Some("/tmp/audio-recording.ogg"));
        assert!(entry.deleted);
    }

    #[test]
    fn journal_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let take = recording(MediaKind::Audio, "audio/wav", 2);
        Journal::new(dir.path()).record(&take).unwrap();

        let entries = Journal::new(dir.path()).entries().unwrap();
        assert_eq!(entries.len(), 1);
    }
}
