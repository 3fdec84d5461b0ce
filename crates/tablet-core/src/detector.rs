//! UltraFace face detector via ONNX Runtime.
//!
//! Runs the "version-RFB-320" UltraFace model (320×240 input, per-anchor
//! background/face scores). Presence only needs the best face score in the
//! frame, so boxes are not decoded.

use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ULTRAFACE_INPUT_WIDTH: u32 = 320;
const ULTRAFACE_INPUT_HEIGHT: u32 = 240;
const ULTRAFACE_MEAN: f32 = 127.0;
const ULTRAFACE_STD: f32 = 128.0;
/// Scores come as `[background, face]` pairs per anchor.
const ULTRAFACE_CLASSES: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("invalid frame: {width}x{height} needs {expected} bytes, got {actual}")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// UltraFace-based face detector.
pub struct FaceDetector {
    session: Session,
    scores_idx: usize,
}

impl FaceDetector {
    /// Load the UltraFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        // Exports name the outputs "scores" and "boxes"; older ones are positional.
        let scores_idx = output_names
            .iter()
            .position(|n| n == "scores")
            .unwrap_or(0);

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            scores_idx,
            "loaded UltraFace model"
        );

        Ok(Self {
            session,
            scores_idx,
        })
    }

    /// Best face confidence in a grayscale frame, 0.0 when there is none.
    pub fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Result<f32, DetectorError> {
        let input = preprocess(gray, width, height)?;
        let scores_idx = self.scores_idx;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;

        Ok(best_face_score(scores))
    }
}

/// Resize a grayscale frame to the model input and normalize it into a
/// 1×3×240×320 tensor (gray replicated into all three channels).
fn preprocess(gray: &[u8], width: u32, height: u32) -> Result<Array4<f32>, DetectorError> {
    let expected = width as usize * height as usize;
    if expected == 0 || gray.len() < expected {
        return Err(DetectorError::InvalidFrame {
            width,
            height,
            expected,
            actual: gray.len(),
        });
    }

    let frame = GrayImage::from_raw(width, height, gray[..expected].to_vec()).ok_or(
        DetectorError::InvalidFrame {
            width,
            height,
            expected,
            actual: gray.len(),
        },
    )?;
    let resized = imageops::resize(
        &frame,
        ULTRAFACE_INPUT_WIDTH,
        ULTRAFACE_INPUT_HEIGHT,
        FilterType::Triangle,
    );

    let mut tensor = Array4::<f32>::zeros((
        1,
        3,
        ULTRAFACE_INPUT_HEIGHT as usize,
        ULTRAFACE_INPUT_WIDTH as usize,
    ));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let normalized = (pixel.0[0] as f32 - ULTRAFACE_MEAN) / ULTRAFACE_STD;
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = normalized;
        }
    }

    Ok(tensor)
}

fn best_face_score(scores: &[f32]) -> f32 {
    scores
        .chunks_exact(ULTRAFACE_CLASSES)
        .map(|pair| pair[1])
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_face_score_picks_face_column() {
        // Background scores are high, face column is the second of each pair.
        let scores = [0.99, 0.01, 0.2, 0.8, 0.6, 0.4];
        assert!((best_face_score(&scores) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_best_face_score_empty() {
        assert_eq!(best_face_score(&[]), 0.0);
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let frame = vec![255u8; 640 * 480];
        let tensor = preprocess(&frame, 640, 480).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 240, 320]);
        let expected = (255.0 - ULTRAFACE_MEAN) / ULTRAFACE_STD;
        assert!(tensor.iter().all(|&v| (v - expected).abs() < 1e-6));
    }

    #[test]
    fn test_preprocess_channels_match() {
        let frame: Vec<u8> = (0..64 * 48).map(|i| (i % 251) as u8).collect();
        let tensor = preprocess(&frame, 64, 48).unwrap();
        for y in [0usize, 100, 239] {
            for x in [0usize, 160, 319] {
                let r = tensor[[0, 0, y, x]];
                assert_eq!(r, tensor[[0, 1, y, x]]);
                assert_eq!(r, tensor[[0, 2, y, x]]);
            }
        }
    }

    #[test]
    fn test_preprocess_rejects_short_frame() {
        let frame = vec![0u8; 10];
        assert!(matches!(
            preprocess(&frame, 640, 480),
            Err(DetectorError::InvalidFrame { expected: 307200, actual: 10, .. })
        ));
        assert!(preprocess(&[], 0, 0).is_err());
    }

    #[test]
    fn test_load_missing_model() {
        let result = FaceDetector::load(Path::new("/nonexistent/ultraface.onnx"));
        assert!(matches!(result, Err(DetectorError::ModelNotFound(_))));
    }
}
