use std::path::Path;

use crate::detection::domain::analysis_stages::{ExpressionScorer, ExpressionScores};
use crate::shared::frame::Frame;

use super::onnx_session::{load_session, model_input_size, resize_crop};

/// FER+ takes a 64x64 grayscale face with raw 0-255 intensities.
const INPUT_SIZE: u32 = 64;

/// FER+ expression classifier (8 classes, logits output).
pub struct OnnxExpressionScorer {
    session: ort::session::Session,
    input_size: u32,
}

impl OnnxExpressionScorer {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let input_size = model_input_size(&session)
            .map(|(h, _)| h)
            .unwrap_or(INPUT_SIZE);
        Ok(Self {
            session,
            input_size,
        })
    }

    fn score_one(&mut self, face: &Frame) -> Result<ExpressionScores, Box<dyn std::error::Error>> {
        let tensor = preprocess(face, self.input_size);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        let logits = outputs[0].try_extract_array::<f32>()?;
        let logits = logits.as_slice().ok_or("Cannot get expression logits")?;
        ExpressionScores::from_logits(logits).ok_or_else(|| {
            format!("expected 8 finite expression logits, got {}", logits.len()).into()
        })
    }
}

impl ExpressionScorer for OnnxExpressionScorer {
    fn score(&mut self, faces: &[Frame]) -> Result<Vec<ExpressionScores>, Box<dyn std::error::Error>> {
        faces.iter().map(|face| self.score_one(face)).collect()
    }
}

fn preprocess(face: &Frame, size: u32) -> ndarray::Array4<f32> {
    let resized = resize_crop(face, size, size);
    let gray = image::imageops::grayscale(&resized);
    let s = size as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 1, s, s));
    for (x, y, pixel) in gray.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel.0[0] as f32;
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_preprocess_shape_and_range() {
        let face = Frame::new(vec![255u8; 20 * 30 * 3], 20, 30, 3, 0);
        let tensor = preprocess(&face, 64);
        assert_eq!(tensor.shape(), &[1, 1, 64, 64]);
        assert_relative_eq!(tensor[[0, 0, 32, 32]], 255.0);
    }

    #[test]
    fn test_preprocess_uses_luma() {
        let face = Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, 3, 0);
        let tensor = preprocess(&face, 64);
        assert!(tensor.iter().all(|v| *v == 0.0));
    }
}
