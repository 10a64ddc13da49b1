//! File logging for tapedeck.
//!
//! Logs go to a daily-rotated file in the XDG state directory, never to the
//! terminal, which belongs to the TUI. Old files beyond the last seven are
//! removed at start-up.

use anyhow::anyhow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;

/// File name prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "tapedeck.log";
const MAX_LOG_FILES: usize = 7;

/// Keeps the non-blocking writer alive for the whole program.
static APPENDER_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Installs the global subscriber. The level comes from `RUST_LOG`
/// (default `info`).
///
/// # Errors
/// - If the log directory cannot be determined or created
/// - If logging was already initialized
pub fn init_logging() -> anyhow::Result<()> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)?;

    if let Err(e) = cleanup_old_logs(&log_dir) {
        eprintln!("Warning: Failed to clean up old logs: {e}");
    }

    let file_appender = rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    APPENDER_GUARD
        .set(guard)
        .map_err(|_| anyhow!("Logging already initialized"))?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false),
        )
        .init();

    tracing::debug!("Logging to {}", log_dir.display());
    Ok(())
}

/// `$XDG_STATE_HOME/tapedeck`, or `~/.local/state/tapedeck`.
///
/// # Errors
/// - If the home directory cannot be determined
pub fn log_dir() -> anyhow::Result<PathBuf> {
    match std::env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        Some(state) => Ok(PathBuf::from(state).join("tapedeck")),
        None => Ok(dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not determine home directory"))?
            .join(".local/state/tapedeck")),
    }
}

/// Deletes dated log files beyond the newest seven.
fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    let dated_prefix = format!("{LOG_FILE_PREFIX}.");
    let mut log_files: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let name = path.file_name()?.to_str()?;
            if !name.starts_with(&dated_prefix) {
                return None;
            }
            let modified = fs::metadata(&path).ok()?.modified().ok()?;
            Some((path, modified))
        })
        .collect();

    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Warning: Failed to delete old log file {}: {e}", path.display()),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_seven_newest_logs() {
        let dir = tempfile::tempdir().unwrap();
        for day in 1..=9 {
            let path = dir.path().join(format!("{LOG_FILE_PREFIX}.2024-03-0{day}"));
            fs::write(&path, "x").unwrap();
            let mtime = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(day * 86_400);
            fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
        }
        fs::write(dir.path().join("other.txt"), "x").unwrap();

        assert_eq!(cleanup_old_logs(dir.path()).unwrap(), 2);
        assert!(!dir.path().join(format!("{LOG_FILE_PREFIX}.2024-03-01")).exists());
        assert!(!dir.path().join(format!("{LOG_FILE_PREFIX}.2024-03-02")).exists());
        assert!(dir.path().join(format!("{LOG_FILE_PREFIX}.2024-03-03")).exists());
        assert!(dir.path().join("other.txt").exists());
    }
}
