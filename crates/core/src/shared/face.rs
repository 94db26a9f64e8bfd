use std::fmt;

use serde::{Deserialize, Serialize};

/// Axis-aligned box in source-image pixel space, top-left origin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Intersects the box with `[0, width] x [0, height]`.
    ///
    /// The result always has non-negative components; a box entirely outside
    /// the frame collapses to zero size on the nearest edge.
    pub fn clamped_to(&self, width: u32, height: u32) -> BoundingBox {
        let (fw, fh) = (width as f64, height as f64);
        let x1 = self.x.min(self.x + self.width).clamp(0.0, fw);
        let y1 = self.y.min(self.y + self.height).clamp(0.0, fh);
        let x2 = self.x.max(self.x + self.width).clamp(0.0, fw);
        let y2 = self.y.max(self.y + self.height).clamp(0.0, fh);
        BoundingBox::from_corners(x1, y1, x2, y2)
    }

    /// Maps the box into another pixel space, scaling each axis independently.
    pub fn scaled(&self, sx: f64, sy: f64) -> BoundingBox {
        BoundingBox::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

/// Expression vocabulary for engines that produce expression scores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Happy,
    Surprised,
    Sad,
    Angry,
    Disgusted,
    Fearful,
    Contempt,
}

impl Emotion {
    pub const ALL: &[Emotion] = &[
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Surprised,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Disgusted,
        Emotion::Fearful,
        Emotion::Contempt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Surprised => "surprised",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Disgusted => "disgusted",
            Emotion::Fearful => "fearful",
            Emotion::Contempt => "contempt",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One face from a detection batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    /// Stable within one batch only.
    pub id: String,
    pub bounding_box: BoundingBox,
    pub age: f64,
    pub gender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
}

impl DetectedFace {
    pub fn rounded_age(&self) -> u32 {
        self.age.max(0.0).round() as u32
    }

    /// Overlay label, e.g. `"female, ~30 yrs"` or `"male, ~41 yrs (happy)"`.
    pub fn label(&self) -> String {
        let base = format!("{}, ~{} yrs", self.gender, self.rounded_age());
        match self.emotion {
            Some(emotion) => format!("{base} ({emotion})"),
            None => base,
        }
    }
}
