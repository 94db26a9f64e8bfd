use std::path::Path;

use crate::shared::constants::{content_type_for_extension, DEFAULT_MAX_UPLOAD_BYTES};
use crate::shared::error::FaceFeedError;

/// A user-supplied file together with its declared content type.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Reads a local file, deriving the content type from its extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, content_type_for_extension(&ext), bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Acceptance rules applied to uploads before decoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadPolicy {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn validate(&self, file: &UploadedFile) -> Result<(), FaceFeedError> {
        if !file.content_type.starts_with("image/") {
            return Err(FaceFeedError::InvalidInput {
                content_type: file.content_type.clone(),
            });
        }
        if file.size() > self.max_bytes {
            return Err(FaceFeedError::TooLarge {
                size: file.size(),
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}
