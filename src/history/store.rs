//! In-memory store of finished recordings, newest first.

use crate::capture::MediaKind;
use crate::recording::Media;
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;

/// Unique identifier of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordingId(uuid::Uuid);

impl RecordingId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RecordingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A finished recording. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub id: RecordingId,
    pub media: Media,
    pub created_at: DateTime<Local>,
    pub duration_seconds: u64,
    pub kind: MediaKind,
}

impl Recording {
    pub fn new(media: Media, duration_seconds: u64, kind: MediaKind) -> Self {
        Self {
            id: RecordingId::new(),
            media,
            created_at: Local::now(),
            duration_seconds,
            kind,
        }
    }
}

/// Session-local list of recordings, most recent first.
#[derive(Debug, Default)]
pub struct RecordingStore {
    recordings: VecDeque<Recording>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, recording: Recording) {
        tracing::debug!("Storing recording {}", recording.id);
        self.recordings.push_front(recording);
    }

    /// Removes and returns the recording; `None` if it is not stored.
    pub fn delete(&mut self, id: RecordingId) -> Option<Recording> {
        let index = self.position(id)?;
        self.recordings.remove(index)
    }

    pub fn get(&self, id: RecordingId) -> Option<&Recording> {
        self.recordings.iter().find(|r| r.id == id)
    }

    /// Index of the recording in list order.
    pub fn position(&self, id: RecordingId) -> Option<usize> {
        self.recordings.iter().position(|r| r.id == id)
    }

    /// Snapshot of the current order. Media bytes are shared, not copied.
    pub fn list(&self) -> Vec<Recording> {
        self.recordings.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recording> {
        self.recordings.iter()
    }

    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    /// Drops every recording and with it every media handle.
    pub fn clear(&mut self) {
        if !self.recordings.is_empty() {
            tracing::debug!("Releasing {} recordings", self.recordings.len());
        }
        self.recordings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::format::MediaFormat;

    fn recording(byte: u8) -> Recording {
        let media = Media::new(vec![byte], MediaFormat::parse("audio/wav").unwrap());
        Recording::new(media, byte as u64, MediaKind::Audio)
    }

    fn ids(store: &RecordingStore) -> Vec<RecordingId> {
        store.list().iter().map(|r| r.id).collect()
    }

    #[test]
    fn append_puts_newest_first() {
        let mut store = RecordingStore::new();
        let first = recording(1);
        let second = recording(2);
        store.append(first.clone());
        store.append(second.clone());

        assert_eq!(ids(&store), vec![second.id, first.id]);
        assert_eq!(store.position(first.id), Some(1));
    }

    #[test]
    fn delete_removes_only_that_entry() {
        let mut store = RecordingStore::new();
        let keep = recording(1);
        let gone = recording(2);
        store.append(keep.clone());
        store.append(gone.clone());

        let removed = store.delete(gone.id).unwrap();
        assert_eq!(removed.id, gone.id);
        assert_eq!(ids(&store), vec![keep.id]);
        assert!(store.get(gone.id).is_none());
    }

    #[test]
    fn deleting_unknown_id_changes_nothing() {
        let mut store = RecordingStore::new();
        store.append(recording(1));
        let before = store.list();

        assert!(store.delete(RecordingId::new()).is_none());
        assert_eq!(store.list(), before);
    }

    #[test]
    fn list_is_a_snapshot() {
        let mut store = RecordingStore::new();
        store.append(recording(1));
        let snapshot = store.list();

        store.append(recording(2));
        store.clear();
        assert_eq!(snapshot.len(), 1);
        assert!(store.is_empty());
    }
}
