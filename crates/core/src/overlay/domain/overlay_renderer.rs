use crate::config::app_config::OverlayConfig;
use crate::session::result_store::{BatchStatus, DetectionBatchState};
use crate::shared::error::FaceFeedError;
use crate::shared::face::BoundingBox;

use super::draw_surface::{DrawSurface, Rgba};

pub const BUSY_LABEL: &str = "Analyzing...";

/// What to draw on top of the source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayMode {
    /// Boxes, labels and the busy indicator.
    Full,
    /// The source image alone, e.g. after a failed request.
    ImageOnly,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    pub background: Rgba,
    pub box_stroke: Rgba,
    pub box_fill: Rgba,
    pub line_width: u32,
    pub label_text: Rgba,
    pub busy_tint: Rgba,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::with_box_color([0x3B, 0x82, 0xF6], 3)
    }
}

impl OverlayStyle {
    pub fn with_box_color(rgb: [u8; 3], line_width: u32) -> Self {
        let [r, g, b] = rgb;
        Self {
            background: [0, 0, 0, 255],
            box_stroke: [r, g, b, 255],
            box_fill: [r, g, b, 26],
            line_width,
            label_text: [255, 255, 255, 255],
            busy_tint: [0, 0, 0, 96],
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Result<Self, FaceFeedError> {
        let rgb = config
            .box_rgb()
            .map_err(|e| FaceFeedError::RenderFailure(e.to_string()))?;
        Ok(Self::with_box_color(rgb, config.line_width.max(1)))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub boxes_drawn: usize,
    pub busy: bool,
}

/// Draws a detection batch over its source image.
///
/// Boxes are mapped from source-image pixels to surface pixels with an
/// independent scale per axis.
#[derive(Clone, Debug, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn render(
        &self,
        state: &DetectionBatchState,
        surface: &mut dyn DrawSurface,
        mode: OverlayMode,
    ) -> Result<RenderSummary, FaceFeedError> {
        let (sw, sh) = surface.size();
        if sw == 0 || sh == 0 {
            return Err(FaceFeedError::RenderFailure(format!(
                "surface is {sw}x{sh}"
            )));
        }
        surface.clear(self.style.background);

        let Some(image) = state.source_image() else {
            return Ok(RenderSummary::default());
        };
        let (fw, fh) = image.dimensions();
        if fw == 0 || fh == 0 {
            return Err(FaceFeedError::RenderFailure(format!(
                "source image is {fw}x{fh}"
            )));
        }
        surface.draw_image(image)?;

        if mode == OverlayMode::ImageOnly {
            return Ok(RenderSummary::default());
        }

        let show_faces = match state.status() {
            BatchStatus::Ready => true,
            // Previous boxes only make sense on a frame of the same shape.
            BatchStatus::Processing => state.faces_frame_size() == Some((fw, fh)),
            BatchStatus::Idle | BatchStatus::Error(_) => false,
        };

        let (sx, sy) = (sw as f64 / fw as f64, sh as f64 / fh as f64);
        let mut summary = RenderSummary::default();
        if show_faces {
            for face in state.faces() {
                let rect = face.bounding_box.scaled(sx, sy);
                self.draw_face(surface, &rect, &face.label());
                summary.boxes_drawn += 1;
            }
        }

        if state.is_processing() {
            self.draw_busy(surface, sw, sh);
            summary.busy = true;
        }
        Ok(summary)
    }

    fn draw_face(&self, surface: &mut dyn DrawSurface, rect: &BoundingBox, label: &str) {
        surface.fill_rect(rect, self.style.box_fill);
        surface.stroke_rect(rect, self.style.box_stroke, self.style.line_width);

        // Above the box when there is room, otherwise just inside its top edge.
        let label_h = surface.label_height();
        let label_y = if rect.y >= label_h {
            rect.y - label_h
        } else {
            rect.y
        };
        surface.draw_label(
            rect.x,
            label_y,
            label,
            self.style.label_text,
            self.style.box_stroke,
        );
    }

    fn draw_busy(&self, surface: &mut dyn DrawSurface, width: u32, height: u32) {
        let (w, h) = (width as f64, height as f64);
        surface.fill_rect(&BoundingBox::new(0.0, 0.0, w, h), self.style.busy_tint);
        let label_h = surface.label_height();
        surface.draw_label(
            (w / 2.0 - 50.0).max(0.0),
            ((h - label_h) / 2.0).max(0.0),
            BUSY_LABEL,
            self.style.label_text,
            [0, 0, 0, 160],
        );
    }
}
