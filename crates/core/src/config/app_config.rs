use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    AGE_GENDER_MODEL_NAME, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_POLL_INTERVAL_MS,
    EXPRESSION_MODEL_NAME, EXPRESSION_MODEL_URL, GEMINI_API_KEY_ENV, GEMINI_ENDPOINT,
    GEMINI_FALLBACK_API_KEY_ENV, GEMINI_MODEL, LOCALIZER_MODEL_NAME, LOCALIZER_MODEL_URL,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no config directory available on this platform")]
    NoConfigDir,
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Remote,
    Local,
}

impl Engine {
    pub const ALL: &[Engine] = &[Engine::Remote, Engine::Local];
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Remote => write!(f, "remote"),
            Engine::Local => write!(f, "local"),
        }
    }
}

impl FromStr for Engine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" => Ok(Engine::Remote),
            "local" => Ok(Engine::Local),
            other => Err(ConfigError::Invalid(format!(
                "unknown engine '{other}', expected 'remote' or 'local'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device name as libavdevice understands it (`/dev/video0`, `0`, ...).
    pub device: String,
    /// libavdevice input format; platform default when unset.
    pub input_format: Option<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let device = if cfg!(target_os = "linux") {
            "/dev/video0"
        } else if cfg!(target_os = "windows") {
            "video=Integrated Camera"
        } else {
            "0"
        };
        Self {
            device: device.to_string(),
            input_format: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: GEMINI_ENDPOINT.to_string(),
            model: GEMINI_MODEL.to_string(),
            api_key_env: GEMINI_API_KEY_ENV.to_string(),
            timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    /// Reads the API key from `api_key_env`, then `GOOGLE_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        [self.api_key_env.as_str(), GEMINI_FALLBACK_API_KEY_ENV]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A named ONNX model with an optional download location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl ModelSpec {
    pub fn new(name: &str, url: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            url: url.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub confidence: f32,
    /// Bundled model directory searched after the user cache.
    pub models_dir: Option<PathBuf>,
    pub localizer: ModelSpec,
    /// Expression scoring is skipped when unset.
    pub expression: Option<ModelSpec>,
    pub age_gender: ModelSpec,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            models_dir: None,
            localizer: ModelSpec::new(LOCALIZER_MODEL_NAME, Some(LOCALIZER_MODEL_URL)),
            expression: Some(ModelSpec::new(
                EXPRESSION_MODEL_NAME,
                Some(EXPRESSION_MODEL_URL),
            )),
            age_gender: ModelSpec::new(AGE_GENDER_MODEL_NAME, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// `#RRGGBB`.
    pub box_color: String,
    pub line_width: u32,
    /// Overrides the bundled DejaVu Sans label font.
    pub font_path: Option<PathBuf>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            box_color: "#3B82F6".to_string(),
            line_width: 3,
            font_path: None,
        }
    }
}

impl OverlayConfig {
    pub fn box_rgb(&self) -> Result<[u8; 3], ConfigError> {
        parse_hex_color(&self.box_color)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: Engine,
    pub poll_interval_ms: u64,
    pub max_upload_bytes: u64,
    pub camera: CameraConfig,
    pub remote: RemoteConfig,
    pub local: LocalConfig,
    pub overlay: OverlayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: Engine::Remote,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            camera: CameraConfig::default(),
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceFeed").join("config.json"))
    }

    /// Loads the user config, falling back to defaults when it is missing
    /// or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring config: {e}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            ConfigError::Invalid(format!("failed to serialize config: {e}"))
        })?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_upload_bytes must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.local.confidence) {
            return Err(ConfigError::Invalid(format!(
                "local.confidence must be between 0 and 1, got {}",
                self.local.confidence
            )));
        }
        if self.overlay.line_width == 0 {
            return Err(ConfigError::Invalid(
                "overlay.line_width must be greater than 0".into(),
            ));
        }
        self.overlay.box_rgb()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_hex_color(s: &str) -> Result<[u8; 3], ConfigError> {
    let invalid = || ConfigError::Invalid(format!("'{s}' is not a #RRGGBB color"));
    let hex = s.strip_prefix('#').ok_or_else(invalid)?;
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine, Engine::Remote);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.overlay.box_rgb().unwrap(), [0x3B, 0x82, 0xF6]);
        assert_eq!(config.local.age_gender.url, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"engine": "local", "camera": {{"device": "/dev/video2"}}}}"#).unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.engine, Engine::Local);
        assert_eq!(config.camera.device, "/dev/video2");
        assert_eq!(config.camera.input_format, None);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.remote.model, GEMINI_MODEL);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.poll_interval_ms = 750;
        config.overlay.font_path = Some(PathBuf::from("/fonts/a.ttf"));

        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppConfig::load_from(&dir.path().join("absent.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"poll_interval_ms": 0}}"#).unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[rstest]
    #[case("remote", Engine::Remote)]
    #[case("LOCAL", Engine::Local)]
    fn test_engine_from_str(#[case] input: &str, #[case] expected: Engine) {
        assert_eq!(input.parse::<Engine>().unwrap(), expected);
    }

    #[test]
    fn test_engine_from_str_rejects_unknown() {
        assert!("cloud".parse::<Engine>().is_err());
    }

    #[rstest]
    #[case("#000000", [0, 0, 0])]
    #[case("#ff8000", [255, 128, 0])]
    fn test_parse_hex_color(#[case] input: &str, #[case] expected: [u8; 3]) {
        assert_eq!(parse_hex_color(input).unwrap(), expected);
    }

    #[rstest]
    #[case("3B82F6")]
    #[case("#3B82F")]
    #[case("#GGGGGG")]
    fn test_parse_hex_color_rejects(#[case] input: &str) {
        assert!(parse_hex_color(input).is_err());
    }
}
