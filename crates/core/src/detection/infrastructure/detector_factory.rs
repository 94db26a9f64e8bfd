use std::sync::Arc;

use crate::config::app_config::{AppConfig, Engine};
use crate::detection::domain::analysis_stages::ExpressionScorer;
use crate::detection::domain::face_detector::FaceDetector;

use super::gemini_face_detector::GeminiFaceDetector;
use super::model_resolver::{ModelResolver, ProgressFn};
use super::onnx_age_gender_estimator::OnnxAgeGenderEstimator;
use super::onnx_expression_scorer::OnnxExpressionScorer;
use super::onnx_yolo_localizer::OnnxYoloLocalizer;
use super::staged_face_analyzer::StagedFaceAnalyzer;

/// Download progress: `(model_name, bytes_downloaded, total_bytes)`.
pub type DownloadProgress = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Builds the configured engine.
///
/// For the local engine every model is resolved (and downloaded if
/// needed) up front.
pub fn build_detector(
    config: &AppConfig,
    progress: Option<DownloadProgress>,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    match config.engine {
        Engine::Remote => {
            log::info!(
                "Using remote engine {} at {}",
                config.remote.model,
                config.remote.endpoint
            );
            Ok(Box::new(GeminiFaceDetector::new(&config.remote)?))
        }
        Engine::Local => build_local(config, progress),
    }
}

fn build_local(
    config: &AppConfig,
    progress: Option<DownloadProgress>,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    let local = &config.local;
    let resolver = ModelResolver::with_default_cache(local.models_dir.clone())?;
    let reporter = |name: &str| -> Option<ProgressFn> {
        let cb = progress.clone()?;
        let name = name.to_string();
        Some(Box::new(move |done: u64, total: u64| cb(&name, done, total)))
    };

    let localizer_path = resolver.resolve(&local.localizer, reporter(&local.localizer.name))?;
    let localizer = OnnxYoloLocalizer::new(&localizer_path, local.confidence as f64)?;

    let expression: Option<Box<dyn ExpressionScorer>> = match &local.expression {
        Some(spec) => {
            let path = resolver.resolve(spec, reporter(&spec.name))?;
            Some(Box::new(OnnxExpressionScorer::new(&path)?))
        }
        None => None,
    };

    let age_gender_path = resolver.resolve(&local.age_gender, reporter(&local.age_gender.name))?;
    let age_gender = OnnxAgeGenderEstimator::new(&age_gender_path)?;

    log::info!(
        "Using local engine (confidence {:.2}, expressions {})",
        local.confidence,
        if expression.is_some() { "on" } else { "off" }
    );
    Ok(Box::new(StagedFaceAnalyzer::new(
        Box::new(localizer),
        expression,
        Box::new(age_gender),
    )))
}
