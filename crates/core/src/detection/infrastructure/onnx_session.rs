use std::path::Path;

use image::imageops::FilterType;

use crate::shared::frame::Frame;

/// Return the preferred ONNX execution providers for the current platform.
///
/// Falls back to CPU if the platform-specific provider is unavailable.
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

pub fn load_session(model_path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let session = ort::session::Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    log::debug!("Loaded ONNX model {}", model_path.display());
    Ok(session)
}

/// Spatial input size `(height, width)` declared by the first input.
///
/// Accepts NCHW (`[N, C, H, W]`) and NHWC (`[N, H, W, C]`) shapes; returns
/// `None` when the dimensions are dynamic.
pub fn model_input_size(session: &ort::session::Session) -> Option<(u32, u32)> {
    let input = session.inputs().first()?;
    let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() else {
        return None;
    };
    if shape.len() < 4 {
        return None;
    }
    let (h, w) = if shape[1] == 3 || shape[1] == 1 {
        (shape[2], shape[3])
    } else {
        (shape[1], shape[2])
    };
    (h > 0 && w > 0).then_some((h as u32, w as u32))
}

/// Resizes a face crop to the model's input size.
pub fn resize_crop(crop: &Frame, width: u32, height: u32) -> image::RgbImage {
    let rgb = crop
        .to_rgb_image()
        .unwrap_or_else(|| image::RgbImage::new(crop.width().max(1), crop.height().max(1)));
    image::imageops::resize(&rgb, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_crop_dimensions() {
        let crop = Frame::new(vec![100u8; 30 * 20 * 3], 30, 20, 3, 0);
        let resized = resize_crop(&crop, 64, 64);
        assert_eq!(resized.dimensions(), (64, 64));
        assert_eq!(resized.get_pixel(10, 10).0, [100, 100, 100]);
    }
}
