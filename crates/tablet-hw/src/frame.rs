//! Grayscale frames built from raw capture buffers.

use thiserror::Error;

/// Luma below this counts as a dark pixel.
const DARK_LUMA: u8 = 32;
/// Share of dark pixels above which the whole frame is dark.
const DARK_FRAME_FRACTION: f32 = 0.95;

/// Layout of a raw capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, the usual uncompressed webcam format.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Yuyv => 2,
            PixelFormat::Grey => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("{format:?} buffer too short: expected {expected} bytes, got {actual}")]
    TooShort {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// A captured grayscale camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// One luma byte per pixel, row-major.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    /// Covered lens or unlit room; no face can be found in it.
    pub is_dark: bool,
}

impl Frame {
    /// Convert a driver buffer to grayscale. Trailing padding is ignored.
    pub fn from_buffer(
        buf: &[u8],
        format: PixelFormat,
        width: u32,
        height: u32,
        sequence: u32,
    ) -> Result<Self, FrameError> {
        let pixels = width as usize * height as usize;
        let expected = pixels * format.bytes_per_pixel();
        if buf.len() < expected {
            return Err(FrameError::TooShort {
                format,
                expected,
                actual: buf.len(),
            });
        }

        let data: Vec<u8> = match format {
            // [Y0, U, Y1, V]: luma sits on the even bytes.
            PixelFormat::Yuyv => buf[..expected].iter().step_by(2).copied().collect(),
            PixelFormat::Grey => buf[..expected].to_vec(),
        };
        let is_dark = dark_fraction(&data) > DARK_FRAME_FRACTION;

        Ok(Self {
            data,
            width,
            height,
            sequence,
            is_dark,
        })
    }

    /// Mean luma, 0–255.
    pub fn mean_luma(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.data.iter().map(|&p| u64::from(p)).sum();
        sum as f32 / self.data.len() as f32
    }
}

/// Share of pixels darker than [`DARK_LUMA`]. An empty frame is all dark.
pub fn dark_fraction(gray: &[u8]) -> f32 {
    if gray.is_empty() {
        return 1.0;
    }
    let dark = gray.iter().filter(|&&p| p < DARK_LUMA).count();
    dark as f32 / gray.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_keeps_luma() {
        let frame = Frame::from_buffer(&[100, 128, 200, 128], PixelFormat::Yuyv, 2, 1, 7).unwrap();
        assert_eq!(frame.data, vec![100, 200]);
        assert_eq!(frame.sequence, 7);
        assert!(!frame.is_dark);
    }

    #[test]
    fn test_trailing_padding_ignored() {
        let mut yuyv = vec![10, 0, 20, 0, 30, 0, 40, 0];
        yuyv.extend([255u8; 8]);
        let frame = Frame::from_buffer(&yuyv, PixelFormat::Yuyv, 2, 2, 0).unwrap();
        assert_eq!(frame.data, vec![10, 20, 30, 40]);

        let frame = Frame::from_buffer(&[1, 2, 3, 4, 5], PixelFormat::Grey, 2, 2, 0).unwrap();
        assert_eq!(frame.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(matches!(
            Frame::from_buffer(&[100, 128], PixelFormat::Yuyv, 2, 1, 0),
            Err(FrameError::TooShort { expected: 4, actual: 2, .. })
        ));
        assert!(matches!(
            Frame::from_buffer(&[0; 3], PixelFormat::Grey, 2, 2, 0),
            Err(FrameError::TooShort { expected: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn test_dark_frames() {
        let dark = Frame::from_buffer(&[0u8; 1000], PixelFormat::Grey, 100, 10, 0).unwrap();
        assert!(dark.is_dark);

        let mut mostly_dark = vec![10u8; 960];
        mostly_dark.extend([128u8; 40]);
        assert!((dark_fraction(&mostly_dark) - 0.96).abs() < 1e-6);
        assert_eq!(dark_fraction(&[]), 1.0);

        let lit = Frame::from_buffer(&[128u8; 1000], PixelFormat::Grey, 100, 10, 0).unwrap();
        assert!(!lit.is_dark);
    }

    #[test]
    fn test_mean_luma() {
        let frame = Frame::from_buffer(&[0, 100, 200], PixelFormat::Grey, 3, 1, 0).unwrap();
        assert!((frame.mean_luma() - 100.0).abs() < 1e-6);
    }
}
