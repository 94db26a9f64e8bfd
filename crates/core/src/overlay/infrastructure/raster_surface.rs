use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::imageops::FilterType;
use image::RgbaImage;
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::overlay::domain::draw_surface::{DrawSurface, Rgba};
use crate::shared::error::FaceFeedError;
use crate::shared::face::BoundingBox;
use crate::shared::frame::Frame;

const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_HEIGHT: u32 = 20;
const LABEL_PADDING: i32 = 4;

/// DejaVu Sans, used for labels unless another font is configured.
const BUNDLED_FONT: &[u8] = include_bytes!("../../../assets/DejaVuSans.ttf");

/// In-memory RGBA canvas.
pub struct RasterSurface {
    canvas: RgbaImage,
    font: FontArc,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Result<Self, FaceFeedError> {
        if width == 0 || height == 0 {
            return Err(FaceFeedError::RenderFailure(format!(
                "cannot allocate a {width}x{height} surface"
            )));
        }
        let font = FontArc::try_from_slice(BUNDLED_FONT)
            .map_err(|e| FaceFeedError::RenderFailure(format!("invalid bundled font: {e}")))?;
        Ok(Self {
            canvas: RgbaImage::new(width, height),
            font,
        })
    }

    /// Replaces the bundled label font.

    pub fn with_font_file(mut self, path: &Path) -> Result<Self, FaceFeedError> {
        let bytes = std::fs::read(path).map_err(|e| {
            FaceFeedError::RenderFailure(format!("failed to read font {}: {e}", path.display()))
        })?;
        self.font = FontArc::try_from_vec(bytes).map_err(|e| {
            FaceFeedError::RenderFailure(format!("invalid font {}: {e}", path.display()))
        })?;
        Ok(self)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn into_image(self) -> RgbaImage {
        self.canvas
    }

    pub fn save(&self, path: &Path) -> Result<(), FaceFeedError> {
        self.canvas.save(path).map_err(|e| {
            FaceFeedError::RenderFailure(format!("failed to write {}: {e}", path.display()))
        })
    }

    /// Integer pixel bounds of `rect` clipped to the canvas, as
    /// `(x1, y1, x2, y2)` with exclusive ends.
    fn clip(&self, rect: &BoundingBox) -> Option<(u32, u32, u32, u32)> {
        let clamped = rect.clamped_to(self.canvas.width(), self.canvas.height());
        let x1 = clamped.x.round() as u32;
        let y1 = clamped.y.round() as u32;
        let x2 = (clamped.x + clamped.width).round() as u32;
        let y2 = (clamped.y + clamped.height).round() as u32;
        (x2 > x1 && y2 > y1).then_some((x1, y1, x2, y2))
    }

    fn text_width(&self, text: &str) -> u32 {
        text_size(PxScale::from(LABEL_FONT_SIZE), &self.font, text).0
    }
}

fn blend(dst: &mut image::Rgba<u8>, src: Rgba) {
    let alpha = src[3] as u32;
    for c in 0..3 {
        let mixed = (src[c] as u32 * alpha + dst.0[c] as u32 * (255 - alpha)) / 255;
        dst.0[c] = mixed as u8;
    }
    dst.0[3] = 255;
}

impl DrawSurface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn clear(&mut self, color: Rgba) {
        for pixel in self.canvas.pixels_mut() {
            pixel.0 = color;
        }
    }

    fn draw_image(&mut self, frame: &Frame) -> Result<(), FaceFeedError> {
        let rgb = frame.to_rgb_image().ok_or_else(|| {
            FaceFeedError::RenderFailure(format!(
                "cannot draw a {}-channel frame",
                frame.channels()
            ))
        })?;
        let (w, h) = self.canvas.dimensions();
        let scaled = if rgb.dimensions() == (w, h) {
            rgb
        } else {
            image::imageops::resize(&rgb, w, h, FilterType::Triangle)
        };
        for (dst, src) in self.canvas.pixels_mut().zip(scaled.pixels()) {
            let [r, g, b] = src.0;
            dst.0 = [r, g, b, 255];
        }
        Ok(())
    }

    fn stroke_rect(&mut self, rect: &BoundingBox, color: Rgba, line_width: u32) {
        let Some((x1, y1, x2, y2)) = self.clip(rect) else {
            return;
        };
        let (w, h) = (x2 - x1, y2 - y1);
        for i in 0..line_width {
            if 2 * i >= w || 2 * i >= h {
                break;
            }
            let ring = Rect::at((x1 + i) as i32, (y1 + i) as i32).of_size(w - 2 * i, h - 2 * i);
            draw_hollow_rect_mut(&mut self.canvas, ring, image::Rgba(color));
        }
    }

    fn fill_rect(&mut self, rect: &BoundingBox, color: Rgba) {
        let Some((x1, y1, x2, y2)) = self.clip(rect) else {
            return;
        };
        for y in y1..y2 {
            for x in x1..x2 {
                blend(self.canvas.get_pixel_mut(x, y), color);
            }
        }
    }

    fn label_height(&self) -> f64 {
        LABEL_HEIGHT as f64
    }

    fn draw_label(&mut self, x: f64, y: f64, text: &str, text_color: Rgba, background: Rgba) {
        let width = self.text_width(text) + 2 * LABEL_PADDING as u32;
        let background_rect = BoundingBox::new(x, y, width as f64, LABEL_HEIGHT as f64);
        self.fill_rect(&background_rect, background);

        draw_text_mut(
            &mut self.canvas,
            image::Rgba(text_color),
            x.round() as i32 + LABEL_PADDING,
            y.round() as i32 + 2,
            PxScale::from(LABEL_FONT_SIZE),
            &self.font,
            text,
        );
    }
}
