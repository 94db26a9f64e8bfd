use std::time::Instant;

use crate::detection::domain::analysis_stages::{AgeGenderEstimator, ExpressionScorer, FaceLocalizer};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_normalizer::{normalize_faces, RawFace};
use crate::shared::error::FaceFeedError;
use crate::shared::face::{DetectedFace, Emotion};
use crate::shared::frame::Frame;

/// Local multi-stage engine: localize faces, refine crops on landmarks,
/// then run expression and age/gender models on each crop.
///
/// Per-face outputs are zipped by position; a stage that returns a
/// different number of results fails the whole batch.
pub struct StagedFaceAnalyzer {
    localizer: Box<dyn FaceLocalizer>,
    expression: Option<Box<dyn ExpressionScorer>>,
    age_gender: Box<dyn AgeGenderEstimator>,
}

impl StagedFaceAnalyzer {
    pub fn new(
        localizer: Box<dyn FaceLocalizer>,
        expression: Option<Box<dyn ExpressionScorer>>,
        age_gender: Box<dyn AgeGenderEstimator>,
    ) -> Self {
        Self {
            localizer,
            expression,
            age_gender,
        }
    }
}

fn stage_failure(stage: &str, e: impl std::fmt::Display) -> FaceFeedError {
    FaceFeedError::DetectionFailure(format!("{stage} stage failed: {e}"))
}

fn check_len(stage: &str, got: usize, expected: usize) -> Result<(), FaceFeedError> {
    if got != expected {
        return Err(FaceFeedError::DetectionFailure(format!(
            "{stage} stage returned {got} results for {expected} faces"
        )));
    }
    Ok(())
}

impl FaceDetector for StagedFaceAnalyzer {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, FaceFeedError> {
        let start = Instant::now();
        let (fw, fh) = frame.dimensions();

        let located = self
            .localizer
            .localize(frame)
            .map_err(|e| stage_failure("localization", e))?;
        if located.is_empty() {
            return Ok(Vec::new());
        }

        let crops: Vec<Frame> = located
            .iter()
            .map(|face| {
                let region = match &face.landmarks {
                    Some(landmarks) => landmarks.refine(&face.bounding_box, fw, fh),
                    None => face.bounding_box.clamped_to(fw, fh),
                };
                frame.crop(&region)
            })
            .collect();

        let emotions: Vec<Option<Emotion>> = match self.expression.as_mut() {
            Some(scorer) => {
                let scores = scorer
                    .score(&crops)
                    .map_err(|e| stage_failure("expression", e))?;
                check_len("expression", scores.len(), located.len())?;
                scores.iter().map(|s| Some(s.top())).collect()
            }
            None => vec![None; located.len()],
        };

        let attributes = self
            .age_gender
            .estimate(&crops)
            .map_err(|e| stage_failure("age/gender", e))?;
        check_len("age/gender", attributes.len(), located.len())?;

        let raw = located
            .into_iter()
            .zip(attributes)
            .zip(emotions)
            .map(|((face, attrs), emotion)| RawFace {
                bounding_box: face.bounding_box,
                age: attrs.age,
                gender: attrs.gender,
                emotion,
            })
            .collect();

        let faces = normalize_faces(raw, fw, fh)?;
        log::debug!(
            "Local analysis found {} face(s) in {:.0?}",
            faces.len(),
            start.elapsed()
        );
        Ok(faces)
    }
}
