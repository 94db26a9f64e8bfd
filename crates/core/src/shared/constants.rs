pub const LOCALIZER_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const LOCALIZER_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EXPRESSION_MODEL_NAME: &str = "emotion-ferplus-8.onnx";
pub const EXPRESSION_MODEL_URL: &str =
    "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/emotion_ferplus/model/emotion-ferplus-8.onnx";

/// InsightFace gender/age regressor. No public direct-download URL is
/// configured; place the file in the model cache or set one in the config.
pub const AGE_GENDER_MODEL_NAME: &str = "genderage.onnx";

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const GEMINI_FALLBACK_API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Polling interval for live-stream detection.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// JPEG quality used when a frame is shipped to the remote engine.
pub const REMOTE_JPEG_QUALITY: u8 = 85;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff", "tif", "webp"];

/// Declared content type for a file extension (lowercase, without dot).
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "json" => "application/json",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
