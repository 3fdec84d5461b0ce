//! tablet-core: presence debouncing, remote commands, configuration and
//! face detection for the tablet-ha kiosk.
//!
//! Face detection runs an UltraFace ONNX model through ONNX Runtime; the
//! rest of the crate is platform-agnostic and free of I/O besides config
//! loading.

pub mod command;
pub mod config;
pub mod detector;
pub mod presence;
pub mod types;

pub use command::{AppTarget, Command, CommandError, CommandKind};
pub use config::{Config, ConfigError, ScreenAction};
pub use detector::FaceDetector;
pub use presence::PresenceTracker;
pub use types::{AppSelection, DisplayState, FaceSignal, Presence};
