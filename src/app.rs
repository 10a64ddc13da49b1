//! Command-line parsing and command routing.

use crate::commands;
use crate::config::file::ensure_config_file;
use crate::config::get_config_path;
use crate::logging;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::process;

/// A terminal audio/video recorder with live preview and a session list of takes
#[derive(Parser, Debug)]
#[command(name = "tapedeck")]
#[command(version)]
#[command(
    long_about = "A terminal audio/video recorder with live preview and a session list of takes.\n\nDEFAULT COMMAND:\n    If no command is given, 'record' is used.\n\nEXAMPLES:\n    # Record audio from the configured microphone\n    $ tapedeck\n\n    # Record camera plus microphone\n    $ tapedeck record --video\n\n    # Try the studio without touching any device\n    $ tapedeck --synthetic\n\n    # Stop a running recording from a hotkey daemon\n    $ pkill -USR1 tapedeck"
)]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/tapedeck/tapedeck.toml\n    Journal:            ~/.local/share/tapedeck/recordings.db\n    Logs:               ~/.local/state/tapedeck/tapedeck.log.*"
)]
struct Cli {
    /// Start in video mode (record default command)
    #[arg(long, global = true)]
    video: bool,

    /// Use generated test input instead of real devices (record default command)
    #[arg(long, global = true)]
    synthetic: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Open the recording studio (default)
    ///
    /// r records, space pauses, s stops, m switches between audio and video,
    /// enter plays, d exports, x deletes, q quits.
    #[command(visible_alias = "r")]
    Record,

    /// Browse recordings from past sessions
    #[command(visible_alias = "h")]
    History,

    /// Open the configuration file in your editor
    #[command(visible_alias = "c")]
    Config,

    /// List audio input devices, the camera and supported formats
    #[command(name = "list-devices")]
    ListDevices,

    /// Show recent log entries
    Logs,

    /// Generate a shell completion script
    ///
    /// Examples:
    ///   tapedeck completions bash > tapedeck.bash
    ///   tapedeck completions zsh > _tapedeck
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Creates the config file on first run so the studio and editor find it.
fn ensure_config() -> anyhow::Result<()> {
    let config_path = get_config_path()?;
    if ensure_config_file(&config_path)? {
        tracing::info!(
            "First run: wrote default config for version {}",
            env!("CARGO_PKG_VERSION")
        );
    }
    Ok(())
}

/// Parses arguments and runs the selected command.
///
/// # Errors
/// - If logging cannot be initialized
/// - If the selected command fails
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that print to the terminal and need no logging
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "tapedeck", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => {
            if let Err(e) = commands::handle_list_devices() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            return Ok(());
        }
        Some(Commands::Logs) => {
            if let Err(e) = commands::handle_logs() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            return Ok(());
        }
        _ => {}
    }

    logging::init_logging()?;
    ensure_config()?;

    match cli.command {
        None | Some(Commands::Record) => commands::handle_record(cli.video, cli.synthetic).await?,
        Some(Commands::History) => commands::handle_history().await?,
        Some(Commands::Config) => commands::handle_config()?,
        Some(Commands::Completions { .. }) | Some(Commands::ListDevices) | Some(Commands::Logs) => {
            unreachable!("handled before logging is initialized")
        }
    }

    Ok(())
}
