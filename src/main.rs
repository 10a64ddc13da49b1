//! tapedeck: record audio or camera video from the terminal.

mod app;
mod capture;
mod commands;
mod config;
mod error;
mod history;
mod logging;
mod recording;
mod studio;
mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    // Capture streams are not Send, so everything runs on one thread
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let local = tokio::task::LocalSet::new();
    match local.block_on(&runtime, app::run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
