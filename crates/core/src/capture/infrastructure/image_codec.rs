use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::capture::domain::uploaded_file::UploadedFile;
use crate::shared::error::FaceFeedError;
use crate::shared::frame::Frame;

/// Decodes an uploaded image into an RGB frame at its original dimensions.
pub fn decode_upload(file: &UploadedFile, index: usize) -> Result<Frame, FaceFeedError> {
    let decoded = image::load_from_memory(&file.bytes)
        .map_err(|e| FaceFeedError::DecodeFailure(format!("{}: {e}", file.name)))?;
    Ok(Frame::from_rgb_image(decoded.to_rgb8(), index))
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    let color = match frame.channels() {
        1 => ExtendedColorType::L8,
        4 => ExtendedColorType::Rgba8,
        _ => ExtendedColorType::Rgb8,
    };
    JpegEncoder::new_with_quality(&mut buf, quality).encode(
        frame.data(),
        frame.width(),
        frame.height(),
        color,
    )?;
    Ok(buf.into_inner())
}
