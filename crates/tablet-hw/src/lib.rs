//! tablet-hw: hardware abstraction for camera capture and display control.
//!
//! Provides V4L2-based webcam access and a display capability with a sysfs
//! backlight adapter.

pub mod backlight;
pub mod camera;
pub mod display;
pub mod frame;

pub use backlight::Backlight;
pub use camera::{Camera, CameraError, DeviceInfo};
pub use display::{Display, DisplayError, NullDisplay};
pub use frame::{Frame, FrameError, PixelFormat};
