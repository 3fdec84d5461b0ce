//! V4L2 webcam capture via the `v4l` crate.

use crate::frame::{Frame, FrameError, PixelFormat};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Requested capture size; the detector downsizes anyway.
const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 2;
/// `/dev/video0` .. `/dev/video15`.
const MAX_VIDEO_NODES: u32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("{0} does not support video capture")]
    CaptureNotSupported(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A V4L2 capture node found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
}

/// An open webcam, negotiated to 640x480 YUYV (or GREY when that is all the
/// driver offers).
pub struct Camera {
    device: Device,
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    pixel_format: PixelFormat,
}

impl Camera {
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.raw_os_error() == Some(16) || e.to_string().contains("busy") {
                CameraError::DeviceBusy(device_path.to_string())
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("query capabilities: {e}")))?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::CaptureNotSupported(device_path.to_string()));
        }

        let (width, height, pixel_format) = negotiate(&device)?;

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width,
            height,
            ?pixel_format,
            "camera opened"
        );

        Ok(Self {
            device,
            device_path: device_path.to_string(),
            width,
            height,
            pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Grab one frame. The stream is set up per call, which suits a
    /// once-a-second sampler and keeps the device free in between.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("start stream: {e}")))?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("dequeue buffer: {e}")))?;

        Ok(Frame::from_buffer(
            buf,
            self.pixel_format,
            self.width,
            self.height,
            meta.sequence,
        )?)
    }

    /// Capture-capable nodes among `/dev/video*`. Unreadable nodes are skipped.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_VIDEO_NODES)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                    })
            })
            .collect()
    }
}

/// Ask for 640x480 YUYV and accept whatever size the driver settles on, as
/// long as the pixel layout is one we can turn into grayscale.
fn negotiate(device: &Device) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut fmt = device
        .format()
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("get format: {e}")))?;
    fmt.fourcc = FourCC::new(b"YUYV");
    fmt.width = CAPTURE_WIDTH;
    fmt.height = CAPTURE_HEIGHT;

    let got = device
        .set_format(&fmt)
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("set format: {e}")))?;

    let pixel_format = match &got.fourcc.repr {
        b"YUYV" => PixelFormat::Yuyv,
        b"GREY" => PixelFormat::Grey,
        _ => {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "driver offered {}, need YUYV or GREY",
                got.fourcc
            )))
        }
    };
    Ok((got.width, got.height, pixel_format))
}
