//! 2D drawing surface the overlay is rendered onto

mod raster;
mod recording;

pub use raster::RasterCanvas;
pub use recording::{DrawCommand, RecordingCanvas};

use image::RgbaImage;

use crate::error::VisionError;

/// RGBA color with straight alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Convert to an `image` pixel
    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }
}

/// Rectangle in canvas pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

/// Which element the user sees: the live video or the overlay canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layer {
    #[default]
    LiveVideo,
    Overlay,
}

/// 2D surface the capture frame and overlay are drawn on.
///
/// Coordinates are canvas pixels with the origin at the top left.
pub trait Canvas: Send {
    fn dimensions(&self) -> (u32, u32);

    /// Resize the backing store; contents are discarded
    fn resize(&mut self, width: u32, height: u32);

    fn clear(&mut self);

    /// Copy a frame 1:1 at the origin
    fn draw_frame(&mut self, frame: &RgbaImage);

    /// Draw an image scaled to the canvas dimensions, replacing everything
    fn draw_image_scaled(&mut self, image: &RgbaImage);

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32);

    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Draw text with its baseline at `y`
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color);

    fn measure_text(&self, text: &str) -> f32;

    fn set_layer(&mut self, layer: Layer);

    fn layer(&self) -> Layer;

    fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, VisionError>;
}

/// Width of `text` in a proportional sans font of `font_px` size
pub fn approx_text_width(text: &str, font_px: f32) -> f32 {
    text.chars().count() as f32 * font_px * 0.5625
}

pub(crate) fn encode_rgba_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>, VisionError> {
    use image::codecs::jpeg::JpegEncoder;

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(VisionError::InvalidState("Cannot encode an empty canvas".to_string()));
    }

    let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder.encode(rgb.as_raw(), width, height, image::ColorType::Rgb8)?;
    Ok(buffer)
}
