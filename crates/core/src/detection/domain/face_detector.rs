use crate::shared::error::FaceFeedError;
use crate::shared::face::DetectedFace;
use crate::shared::frame::Frame;

/// Capability interface for a face detection engine.
///
/// Returned boxes are in the pixel space of `frame`. An empty list is a
/// valid "no faces" result. Implementations may hold sessions or network
/// clients, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, FaceFeedError>;
}
