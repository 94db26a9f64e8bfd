use crate::shared::error::FaceFeedError;
use crate::shared::face::{BoundingBox, DetectedFace, Emotion};

/// An engine record before validation.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFace {
    pub bounding_box: BoundingBox,
    pub age: f64,
    pub gender: String,
    pub emotion: Option<Emotion>,
}

/// Validates engine output against the frame it was computed on.
///
/// One face per record, in engine order. Boxes are clamped into the frame,
/// negative ages become 0 and blank genders become "unknown". Any
/// non-finite number rejects the whole batch.
pub fn normalize_faces(
    raw: Vec<RawFace>,
    frame_width: u32,
    frame_height: u32,
) -> Result<Vec<DetectedFace>, FaceFeedError> {
    raw.into_iter()
        .enumerate()
        .map(|(i, face)| {
            if !face.bounding_box.is_finite() || !face.age.is_finite() {
                return Err(FaceFeedError::DetectionFailure(format!(
                    "face {i} has non-finite values: {:?}, age {}",
                    face.bounding_box, face.age
                )));
            }
            let gender = face.gender.trim();
            Ok(DetectedFace {
                id: format!("face-{i}"),
                bounding_box: face.bounding_box.clamped_to(frame_width, frame_height),
                age: face.age.max(0.0),
                gender: if gender.is_empty() {
                    "unknown".to_string()
                } else {
                    gender.to_string()
                },
                emotion: face.emotion,
            })
        })
        .collect()
}
