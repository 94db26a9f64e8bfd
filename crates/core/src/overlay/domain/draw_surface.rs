use crate::shared::error::FaceFeedError;
use crate::shared::face::BoundingBox;
use crate::shared::frame::Frame;

/// Straight (non-premultiplied) RGBA color.
pub type Rgba = [u8; 4];

/// A 2D target the overlay renderer draws on, in surface pixels.
pub trait DrawSurface {
    /// `(width, height)`; zero in either axis means no drawable surface.
    fn size(&self) -> (u32, u32);

    fn clear(&mut self, color: Rgba);

    /// Draws `frame` stretched to cover the whole surface.
    fn draw_image(&mut self, frame: &Frame) -> Result<(), FaceFeedError>;

    /// Outlines `rect` with a border `line_width` pixels thick, drawn inward.
    fn stroke_rect(&mut self, rect: &BoundingBox, color: Rgba, line_width: u32);

    /// Alpha-blends `color` over `rect`.
    fn fill_rect(&mut self, rect: &BoundingBox, color: Rgba);

    /// Height of a label box, used to place labels next to boxes.
    fn label_height(&self) -> f64;

    /// Draws `text` on a filled background whose top-left is `(x, y)`.
    fn draw_label(&mut self, x: f64, y: f64, text: &str, text_color: Rgba, background: Rgba);
}
