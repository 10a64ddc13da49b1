//! Command handlers for tapedeck.
//!
//! # Commands
//! - `record`: the interactive recording studio (default)
//! - `history`: journal of recordings from past sessions
//! - `config`: open the configuration file in the user's editor
//! - `list_devices`: list audio input devices and the camera setting
//! - `logs`: print recent log entries

pub mod config;
pub mod history;
pub mod list_devices;
pub mod logs;
pub mod record;

pub use config::handle_config;
pub use history::handle_history;
pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use record::handle_record;
