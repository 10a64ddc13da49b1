//! Journal of past recordings.

use crate::history::{journal, Journal, JournalViewer};

/// Opens the journal viewer, or says so when nothing has been recorded yet.
///
/// # Errors
/// - If the data directory cannot be determined
/// - If the journal cannot be read
/// - If the viewer's terminal cannot be initialized
pub async fn handle_history() -> anyhow::Result<()> {
    tracing::info!("=== tapedeck History Viewer ===");

    let mut journal = Journal::new(&journal::data_dir()?);
    let entries = journal.entries()?;

    if entries.is_empty() {
        println!("No recordings found.");
        return Ok(());
    }

    let mut viewer = JournalViewer::new(entries)?;
    viewer.run()?;

    tracing::debug!("History viewer closed");
    Ok(())
}
