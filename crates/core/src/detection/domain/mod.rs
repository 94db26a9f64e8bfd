pub mod analysis_stages;
pub mod face_detector;
pub mod face_landmarks;
pub mod face_normalizer;
