use std::path::Path;

use crate::detection::domain::analysis_stages::{AgeGender, AgeGenderEstimator};
use crate::shared::frame::Frame;

use super::onnx_session::{load_session, model_input_size, resize_crop};

const INPUT_SIZE: u32 = 96;

/// InsightFace `genderage` regressor.
///
/// Input is a 96x96 RGB crop with raw 0-255 values in NCHW layout. Output is
/// `[female_score, male_score, age / 100]`.
pub struct OnnxAgeGenderEstimator {
    session: ort::session::Session,
    input_size: u32,
}

impl OnnxAgeGenderEstimator {
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

    fn estimate_one(&mut self, face: &Frame) -> Result<AgeGender, Box<dyn std::error::Error>> {
        let tensor = preprocess(face, self.input_size);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        let prediction = outputs[0].try_extract_array::<f32>()?;
        let prediction = prediction.as_slice().ok_or("Cannot get age/gender output")?;
        decode_prediction(prediction)
            .ok_or_else(|| format!("expected 3 age/gender values, got {}", prediction.len()).into())
    }
}

impl AgeGenderEstimator for OnnxAgeGenderEstimator {
    fn estimate(&mut self, faces: &[Frame]) -> Result<Vec<AgeGender>, Box<dyn std::error::Error>> {
        faces.iter().map(|face| self.estimate_one(face)).collect()
    }
}

fn preprocess(face: &Frame, size: u32) -> ndarray::Array4<f32> {
    let resized = resize_crop(face, size, size);
    let s = size as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel.0[c] as f32;
        }
    }
    tensor
}

fn decode_prediction(prediction: &[f32]) -> Option<AgeGender> {
    let [female, male, age, ..] = prediction else {
        return None;
    };
    let gender = if male > female { "male" } else { "female" };
    Some(AgeGender {
        age: (*age as f64) * 100.0,
        gender: gender.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(&[0.9, 0.1, 0.296], "female", 29.6)]
    #[case(&[0.2, 0.8, 0.41], "male", 41.0)]
    fn test_decode_prediction(#[case] pred: &[f32], #[case] gender: &str, #[case] age: f64) {
        let result = decode_prediction(pred).unwrap();
        assert_eq!(result.gender, gender);
        assert_relative_eq!(result.age, age, epsilon = 1e-4);
    }

    #[test]
    fn test_decode_short_output_is_none() {
        assert!(decode_prediction(&[0.5, 0.5]).is_none());
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        let mut data = Vec::new();
        for _ in 0..(4 * 4) {
            data.extend_from_slice(&[10, 20, 30]);
        }
        let tensor = preprocess(&Frame::new(data, 4, 4, 3, 0), 96);
        assert_eq!(tensor.shape(), &[1, 3, 96, 96]);
        assert_relative_eq!(tensor[[0, 0, 48, 48]], 10.0);
        assert_relative_eq!(tensor[[0, 2, 48, 48]], 30.0);
    }
}
