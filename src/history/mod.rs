//! Finished recordings: the in-session store, exports and the metadata journal.

pub mod export;
pub mod journal;
pub mod store;
pub mod ui;

pub use export::{export, export_filename};
pub use journal::{Journal, JournalEntry};
pub use store::{Recording, RecordingId, RecordingStore};
pub use ui::JournalViewer;
