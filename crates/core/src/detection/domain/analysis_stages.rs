//! Model stages composed by the local analyzer: localization, expression
//! scoring and age/gender estimation.

use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::face::{BoundingBox, Emotion};
use crate::shared::frame::Frame;

/// A face found by the localizer, in frame pixel space.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalizedFace {
    pub bounding_box: BoundingBox,
    pub confidence: f64,
    pub landmarks: Option<FaceLandmarks>,
}

pub trait FaceLocalizer: Send {
    fn localize(&mut self, frame: &Frame) -> Result<Vec<LocalizedFace>, Box<dyn std::error::Error>>;
}

/// Probabilities over [`Emotion::ALL`], in that order.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpressionScores([f32; 8]);

impl ExpressionScores {
    pub fn new(probabilities: [f32; 8]) -> Self {
        Self(probabilities)
    }

    /// Normalizes raw model logits with a softmax.
    pub fn from_logits(logits: &[f32]) -> Option<Self> {
        let logits: [f32; 8] = logits.try_into().ok()?;
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps = logits.map(|l| (l - max).exp());
        let sum: f32 = exps.iter().sum();
        (sum > 0.0 && sum.is_finite()).then(|| Self(exps.map(|e| e / sum)))
    }

    pub fn probabilities(&self) -> &[f32; 8] {
        &self.0
    }

    /// Highest-scoring expression. Ties go to the earlier entry.
    pub fn top(&self) -> Emotion {
        let mut best = 0;
        for (i, p) in self.0.iter().enumerate() {
            if *p > self.0[best] {
                best = i;
            }
        }
        Emotion::ALL[best]
    }
}

/// Scores one expression distribution per face crop, in input order.
pub trait ExpressionScorer: Send {
    fn score(&mut self, faces: &[Frame]) -> Result<Vec<ExpressionScores>, Box<dyn std::error::Error>>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct AgeGender {
    pub age: f64,
    pub gender: String,
}

/// Estimates age and gender per face crop, in input order.
pub trait AgeGenderEstimator: Send {
    fn estimate(&mut self, faces: &[Frame]) -> Result<Vec<AgeGender>, Box<dyn std::error::Error>>;
}
