use ndarray::ArrayView3;

use crate::shared::face::BoundingBox;

/// A still image: contiguous RGB bytes in row-major order.
///
/// `index` is the capture sequence number assigned by whichever source
/// produced the frame (camera sample count, upload count).
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn from_rgb_image(image: image::RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index)
    }

    /// Copies the pixels into an `image::RgbImage`.
    ///
    /// Returns `None` for frames that are not 3-channel.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        if self.channels != 3 {
            return None;
        }
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Extracts the pixels inside `bbox`, clamped to frame bounds.
    ///
    /// A box that falls entirely outside the frame yields a 1x1 crop of the
    /// nearest edge pixel so downstream model stages always get an image.
    pub fn crop(&self, bbox: &BoundingBox) -> Frame {
        let clamped = bbox.clamped_to(self.width, self.height);
        let max_x = self.width.saturating_sub(1) as usize;
        let max_y = self.height.saturating_sub(1) as usize;

        let x1 = (clamped.x.floor() as usize).min(max_x);
        let y1 = (clamped.y.floor() as usize).min(max_y);
        let x2 = ((clamped.x + clamped.width).ceil() as usize)
            .min(self.width as usize)
            .max(x1 + 1);
        let y2 = ((clamped.y + clamped.height).ceil() as usize)
            .min(self.height as usize)
            .max(y1 + 1);

        let channels = self.channels as usize;
        let src = self.as_ndarray();
        let mut data = Vec::with_capacity((x2 - x1) * (y2 - y1) * channels);
        for row in y1..y2 {
            for col in x1..x2 {
                for c in 0..channels {
                    data.push(src[[row, col, c]]);
                }
            }
        }

        Frame::new(
            data,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
            self.channels,
            self.index,
        )
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
