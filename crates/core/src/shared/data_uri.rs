use std::fmt;

use base64::Engine;

/// A self-describing data blob: MIME type plus payload.
///
/// Renders as `data:<mime>;base64,<payload>`.
#[derive(Clone, Debug, PartialEq)]
pub struct DataUri {
    mime_type: String,
    data: Vec<u8>,
}

impl DataUri {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Parses `data:<mime>;base64,<payload>`. Returns `None` on any other shape.
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (header, payload) = rest.split_once(',')?;
        let mime_type = header.strip_suffix(";base64")?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .ok()?;
        Some(Self::new(mime_type, data))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn base64_payload(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.base64_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        let uri = DataUri::new("image/png", vec![1, 2, 3]);
        assert_eq!(uri.to_string(), "data:image/png;base64,AQID");
    }

    #[test]
    fn test_parse_display_output() {
        let uri = DataUri::new("image/jpeg", b"jpeg bytes".to_vec());
        let parsed = DataUri::parse(&uri.to_string()).unwrap();
        assert_eq!(parsed, uri);
    }

    #[test]
    fn test_parse_rejects_non_base64_uri() {
        assert!(DataUri::parse("data:text/plain,hello").is_none());
        assert!(DataUri::parse("https://example.com/a.png").is_none());
        assert!(DataUri::parse("data:image/png;base64,@@@").is_none());
    }
}
