//! Recording for tapedeck.
//!
//! Format negotiation, the encoders that turn a live stream into container
//! bytes, the recorder state machine that buffers them, and the studio's
//! terminal front end.

pub mod encoder;
pub mod ffmpeg;
pub mod format;
pub mod meter;
pub mod playback;
pub mod preview;
pub mod recorder;
pub mod timer;
pub mod ui;
pub mod wav;

pub use encoder::PlatformEncoders;
pub use format::{FormatPreferences, MediaFormat};
pub use recorder::{Media, Phase, Recorder};
pub use timer::Timer;
pub use ui::{intent_for, spawn_key_reader, Intent, StudioTui, StudioView};
