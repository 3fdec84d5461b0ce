//! Display control capability.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("no backlight device found under {0}")]
    NoBacklight(PathBuf),
    #[error("backlight {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("backlight {path}: unexpected contents {contents:?}")]
    Malformed { path: PathBuf, contents: String },
}

/// Brightness and power control for the screen the kiosk runs on.
///
/// Implementations are synchronous; callers treat failures as best-effort.
pub trait Display: Send {
    /// Set brightness in percent (0–100).
    fn set_brightness(&mut self, level: u8) -> Result<(), DisplayError>;

    /// Switch the panel on or off.
    fn set_power(&mut self, on: bool) -> Result<(), DisplayError>;

    /// Short name for logs and diagnostics.
    fn name(&self) -> String;
}

/// Stand-in used when the machine exposes no controllable backlight.
/// Requests are logged and succeed.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn set_brightness(&mut self, level: u8) -> Result<(), DisplayError> {
        tracing::debug!(level, "null display: brightness");
        Ok(())
    }

    fn set_power(&mut self, on: bool) -> Result<(), DisplayError> {
        tracing::debug!(on, "null display: power");
        Ok(())
    }

    fn name(&self) -> String {
        "none".into()
    }
}

impl Display for Box<dyn Display> {
    fn set_brightness(&mut self, level: u8) -> Result<(), DisplayError> {
        (**self).set_brightness(level)
    }

    fn set_power(&mut self, on: bool) -> Result<(), DisplayError> {
        (**self).set_power(on)
    }

    fn name(&self) -> String {
        (**self).name()
    }
}
