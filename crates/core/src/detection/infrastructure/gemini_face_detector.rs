//! Remote engine backed by a Gemini `generateContent` endpoint.
//!
//! The frame is sent as an inline JPEG part with a fixed instruction and a
//! JSON response schema. The model's structured output is parsed into
//! [`RawFace`] records and normalized against the frame.

use std::time::Instant;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::capture::infrastructure::image_codec::encode_jpeg;
use crate::config::app_config::RemoteConfig;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_normalizer::{normalize_faces, RawFace};
use crate::shared::constants::REMOTE_JPEG_QUALITY;
use crate::shared::data_uri::DataUri;
use crate::shared::error::FaceFeedError;
use crate::shared::face::{BoundingBox, DetectedFace};
use crate::shared::frame::Frame;

const INSTRUCTION: &str = "You are an expert in face detection and analysis. \
Detect all faces in the provided image. For each face, return its bounding box \
as x, y, width and height in pixels measured from the top-left corner of the \
image, and estimate the person's age in years and gender. \
If no faces are found, return an empty array for 'faces'.";

pub struct GeminiFaceDetector {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
}

impl GeminiFaceDetector {
    pub fn new(config: &RemoteConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let api_key = config.api_key().ok_or_else(|| {
            format!(
                "no API key found; set {} to use the remote engine",
                config.api_key_env
            )
        })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            url: format!(
                "{}/models/{}:generateContent",
                config.endpoint.trim_end_matches('/'),
                config.model
            ),
            api_key,
        })
    }
}

impl FaceDetector for GeminiFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, FaceFeedError> {
        let start = Instant::now();
        let (width, height) = frame.dimensions();

        let jpeg = encode_jpeg(frame, REMOTE_JPEG_QUALITY)
            .map_err(|e| FaceFeedError::DetectionFailure(format!("failed to encode frame: {e}")))?;
        let image = DataUri::new("image/jpeg", jpeg);
        let body = request_body(&image, width, height);

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| FaceFeedError::DetectionFailure(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| FaceFeedError::DetectionFailure(format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(FaceFeedError::DetectionFailure(format!(
                "engine returned HTTP {status}: {}",
                truncate(&text, 200)
            )));
        }

        let raw = parse_response(&text)?;
        let faces = normalize_faces(raw, width, height)?;
        log::debug!(
            "Remote analysis found {} face(s) in {:.0?}",
            faces.len(),
            start.elapsed()
        );
        Ok(faces)
    }
}

fn request_body(image: &DataUri, width: u32, height: u32) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": format!("{INSTRUCTION} The image is {width}x{height} pixels.") },
                { "inlineData": {
                    "mimeType": image.mime_type(),
                    "data": image.base64_payload(),
                } }
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema(),
        }
    })
}

fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "faces": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "box": {
                            "type": "OBJECT",
                            "properties": {
                                "x": { "type": "NUMBER" },
                                "y": { "type": "NUMBER" },
                                "width": { "type": "NUMBER" },
                                "height": { "type": "NUMBER" }
                            },
                            "required": ["x", "y", "width", "height"]
                        },
                        "age": { "type": "NUMBER" },
                        "gender": { "type": "STRING" }
                    },
                    "required": ["box", "age", "gender"]
                }
            }
        },
        "required": ["faces"]
    })
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct FaceOutput {
    #[serde(default)]
    faces: Vec<FaceRecord>,
}

#[derive(Deserialize)]
struct FaceRecord {
    #[serde(rename = "box", alias = "boundingBox")]
    bounding_box: BoundingBox,
    age: f64,
    gender: String,
}

/// Extracts face records from a `generateContent` response body.
///
/// A response without candidates or without structured output is an
/// empty batch.
fn parse_response(body: &str) -> Result<Vec<RawFace>, FaceFeedError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| FaceFeedError::DetectionFailure(format!("malformed response: {e}")))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    parse_face_output(&text)
}

fn parse_face_output(text: &str) -> Result<Vec<RawFace>, FaceFeedError> {
    let output: Option<FaceOutput> = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| FaceFeedError::DetectionFailure(format!("malformed face output: {e}")))?;

    Ok(output
        .map(|o| o.faces)
        .unwrap_or_default()
        .into_iter()
        .map(|record| RawFace {
            bounding_box: record.bounding_box,
            age: record.age,
            gender: record.gender,
            emotion: None,
        })
        .collect())
}

/// Models occasionally wrap JSON in a markdown fence despite the MIME type.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
