use thiserror::Error;

/// Failures surfaced to the user by the orchestration boundary.
///
/// Every variant is recoverable: it turns into a notice, never a crash.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FaceFeedError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("capture device busy: {0}")]
    DeviceBusy(String),
    #[error("unsupported file type '{content_type}'")]
    InvalidInput { content_type: String },
    #[error("file is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("failed to decode image: {0}")]
    DecodeFailure(String),
    #[error("face detection failed: {0}")]
    DetectionFailure(String),
    #[error("failed to render overlay: {0}")]
    RenderFailure(String),
}

impl FaceFeedError {
    /// Short heading for a user-facing notice.
    pub fn title(&self) -> &'static str {
        match self {
            FaceFeedError::DeviceUnavailable(_) | FaceFeedError::DeviceBusy(_) => "Webcam Error",
            FaceFeedError::InvalidInput { .. } => "Invalid File Type",
            FaceFeedError::TooLarge { .. } => "File Too Large",
            FaceFeedError::DecodeFailure(_) => "File Read Error",
            FaceFeedError::DetectionFailure(_) => "Analysis Error",
            FaceFeedError::RenderFailure(_) => "Display Error",
        }
    }

    /// One-sentence description for a user-facing notice.
    pub fn description(&self) -> String {
        match self {
            FaceFeedError::DeviceUnavailable(_) => {
                "Could not access webcam. Please check that one is connected and permitted."
                    .to_string()
            }
            FaceFeedError::DeviceBusy(_) => {
                "The webcam is in use by another application.".to_string()
            }
            FaceFeedError::InvalidInput { .. } => {
                "Please upload an image file (e.g., JPG, PNG, WEBP).".to_string()
            }
            FaceFeedError::TooLarge { limit, .. } => {
                format!("Image size should be less than {}MB.", limit / (1024 * 1024))
            }
            FaceFeedError::DecodeFailure(_) => {
                "Could not read the selected file. Please try another image.".to_string()
            }
            FaceFeedError::DetectionFailure(_) => {
                "Failed to analyze the image. Please try again.".to_string()
            }
            FaceFeedError::RenderFailure(_) => "Could not draw the analysis results.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FaceFeedError::DeviceUnavailable("denied".into()), "Webcam Error")]
    #[case(FaceFeedError::DeviceBusy("busy".into()), "Webcam Error")]
    #[case(FaceFeedError::InvalidInput { content_type: "text/plain".into() }, "Invalid File Type")]
    #[case(FaceFeedError::TooLarge { size: 10, limit: 5 }, "File Too Large")]
    #[case(FaceFeedError::DecodeFailure("eof".into()), "File Read Error")]
    #[case(FaceFeedError::DetectionFailure("timeout".into()), "Analysis Error")]
    #[case(FaceFeedError::RenderFailure("zero size".into()), "Display Error")]
    fn test_titles(#[case] error: FaceFeedError, #[case] title: &str) {
        assert_eq!(error.title(), title);
    }

    #[test]
    fn test_too_large_description_reports_limit_in_megabytes() {
        let e = FaceFeedError::TooLarge {
            size: 10 * 1024 * 1024,
            limit: 5 * 1024 * 1024,
        };
        assert_eq!(e.description(), "Image size should be less than 5MB.");
    }

    #[test]
    fn test_display_includes_detail() {
        let e = FaceFeedError::InvalidInput {
            content_type: "text/plain".into(),
        };
        assert_eq!(e.to_string(), "unsupported file type 'text/plain'");
    }
}
