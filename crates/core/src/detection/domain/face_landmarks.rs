//! 5-point landmarks used to re-centre face crops before attribute models.
//!
//! The nose carries the most weight in the centroid since it stays inside
//! the face outline across head rotations.

use crate::shared::face::BoundingBox;

const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
const NOSE: usize = 2;

/// Landmark weights: [left_eye, right_eye, nose, left_mouth, right_mouth].
const WEIGHTS: [f64; 5] = [2.0, 2.0, 3.0, 1.0, 1.0];

/// Extra crop margin applied to a full-profile face.
const PROFILE_MARGIN: f64 = 0.25;

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    /// Points with x <= 0 are treated as invisible.
    points: [(f64, f64); 5],
}

impl FaceLandmarks {
    pub fn new(points: [(f64, f64); 5]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64); 5] {
        &self.points
    }

    /// Weighted centroid of visible landmarks, or `None` if none are visible.
    pub fn center(&self) -> Option<(f64, f64)> {
        let (mut wx, mut wy, mut total) = (0.0, 0.0, 0.0);
        for ((x, y), w) in self.points.iter().zip(WEIGHTS) {
            if *x > 0.0 {
                wx += x * w;
                wy += y * w;
                total += w;
            }
        }
        (total > 0.0).then(|| (wx / total, wy / total))
    }

    /// 0.0 for a frontal face, 1.0 for a full profile.
    pub fn profile_ratio(&self) -> f64 {
        let nose = self.points[NOSE];
        let left_eye = self.points[LEFT_EYE];
        let right_eye = self.points[RIGHT_EYE];
        if nose.0 <= 0.0 || left_eye.0 <= 0.0 || right_eye.0 <= 0.0 {
            return 0.0;
        }

        let eye_span = (right_eye.0 - left_eye.0).abs();
        if eye_span <= 0.0 {
            return 0.0;
        }
        let eye_mid_x = (left_eye.0 + right_eye.0) / 2.0;
        ((nose.0 - eye_mid_x).abs() / eye_span).min(1.0)
    }

    /// Square crop centred on the landmark centroid, covering `bbox`'s
    /// longer side and widened for turned heads, clamped to the frame.
    ///
    /// Falls back to the box centre when no landmark is visible.
    pub fn refine(&self, bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> BoundingBox {
        let (cx, cy) = self.center().unwrap_or_else(|| bbox.center());
        let side = bbox.width.max(bbox.height) * (1.0 + PROFILE_MARGIN * self.profile_ratio());
        let half = side / 2.0;
        BoundingBox::new(cx - half, cy - half, side, side).clamped_to(frame_width, frame_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn frontal() -> FaceLandmarks {
        FaceLandmarks::new([
            (440.0, 350.0),
            (560.0, 350.0),
            (500.0, 420.0),
            (460.0, 470.0),
            (540.0, 470.0),
        ])
    }

    #[test]
    fn test_center_weights_nose() {
        // (440*2 + 560*2 + 500*3 + 460 + 540) / 9 = 500
        // (350*2 + 350*2 + 420*3 + 470 + 470) / 9 = 400
        let (cx, cy) = frontal().center().unwrap();
        assert_relative_eq!(cx, 500.0, epsilon = 0.01);
        assert_relative_eq!(cy, 400.0, epsilon = 0.01);
    }

    #[test]
    fn test_center_ignores_invisible_points() {
        let mut pts = [(0.0, 0.0); 5];
        pts[NOSE] = (300.0, 400.0);
        assert_eq!(FaceLandmarks::new(pts).center(), Some((300.0, 400.0)));
    }

    #[test]
    fn test_center_none_when_nothing_visible() {
        assert_eq!(FaceLandmarks::new([(0.0, 0.0); 5]).center(), None);
    }

    #[rstest]
    #[case::frontal([(440.0, 0.0), (560.0, 0.0), (500.0, 0.0), (0.0, 0.0), (0.0, 0.0)], 0.0)]
    #[case::turned([(120.0, 0.0), (180.0, 0.0), (100.0, 0.0), (0.0, 0.0), (0.0, 0.0)], 50.0 / 60.0)]
    #[case::clamped([(100.0, 0.0), (110.0, 0.0), (200.0, 0.0), (0.0, 0.0), (0.0, 0.0)], 1.0)]
    #[case::nose_hidden([(100.0, 0.0), (200.0, 0.0), (0.0, 0.0), (0.0, 0.0), (0.0, 0.0)], 0.0)]
    fn test_profile_ratio(#[case] pts: [(f64, f64); 5], #[case] expected: f64) {
        assert_relative_eq!(FaceLandmarks::new(pts).profile_ratio(), expected, epsilon = 0.01);
    }

    #[test]
    fn test_refine_frontal_is_square_on_centroid() {
        let bbox = BoundingBox::new(420.0, 320.0, 160.0, 200.0);
        let refined = frontal().refine(&bbox, 1000, 1000);
        assert_relative_eq!(refined.width, 200.0);
        assert_relative_eq!(refined.height, 200.0);
        assert_relative_eq!(refined.center().0, 500.0, epsilon = 0.01);
        assert_relative_eq!(refined.center().1, 400.0, epsilon = 0.01);
    }

    #[test]
    fn test_refine_widens_profile_faces() {
        let lm = FaceLandmarks::new([
            (100.0, 100.0),
            (110.0, 100.0),
            (200.0, 100.0),
            (0.0, 0.0),
            (0.0, 0.0),
        ]);
        let bbox = BoundingBox::new(80.0, 50.0, 100.0, 100.0);
        let refined = lm.refine(&bbox, 1000, 1000);
        assert_relative_eq!(refined.width, 125.0, epsilon = 0.01);
    }

    #[test]
    fn test_refine_clamps_to_frame() {
        let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let mut pts = [(0.0, 0.0); 5];
        pts[NOSE] = (10.0, 10.0);
        let refined = FaceLandmarks::new(pts).refine(&bbox, 640, 480);
        assert_relative_eq!(refined.x, 0.0);
        assert_relative_eq!(refined.y, 0.0);
        assert_relative_eq!(refined.width, 60.0);
    }

    #[test]
    fn test_refine_without_landmarks_uses_box_center() {
        let bbox = BoundingBox::new(100.0, 100.0, 50.0, 80.0);
        let refined = FaceLandmarks::new([(0.0, 0.0); 5]).refine(&bbox, 1000, 1000);
        assert_eq!(refined.center(), bbox.center());
        assert_relative_eq!(refined.width, 80.0);
    }
}
