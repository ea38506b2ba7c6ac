use image::imageops::{self, FilterType};
use image::RgbaImage;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect as PixelRect;
use rusttype::{Font, Scale};
use std::sync::OnceLock;
use tracing::warn;

use super::{approx_text_width, encode_rgba_jpeg, Canvas, Color, Layer, Rect};
use crate::error::VisionError;

/// Text drawn on a raster canvas
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

const LABEL_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

fn label_font() -> Option<&'static Font<'static>> {
    static FONT: OnceLock<Option<Font<'static>>> = OnceLock::new();
    FONT.get_or_init(|| {
        let font = Font::try_from_bytes(LABEL_FONT);
        if font.is_none() {
            warn!("Embedded label font failed to parse; labels will not be painted");
        }
        font
    })
    .as_ref()
}

/// Pixel-buffer canvas.
///
/// Labels are painted with an embedded sans font. Every text run is also
/// kept with its position so a host can read back what was written.
#[derive(Debug, Clone)]
pub struct RasterCanvas {
    image: RgbaImage,
    font_px: f32,
    layer: Layer,
    texts: Vec<TextRun>,
}

impl RasterCanvas {
    /// Transparent canvas of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            font_px: 16.0,
            layer: Layer::LiveVideo,
            texts: Vec::new(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Text runs drawn since the last clear
    pub fn texts(&self) -> &[TextRun] {
        &self.texts
    }
}

impl Default for RasterCanvas {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

fn pixel_rect(x: f32, y: f32, width: f32, height: f32) -> Option<PixelRect> {
    let w = width.round() as i64;
    let h = height.round() as i64;
    if w <= 0 || h <= 0 {
        return None;
    }
    Some(PixelRect::at(x.round() as i32, y.round() as i32).of_size(w as u32, h as u32))
}

impl Canvas for RasterCanvas {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
        self.texts.clear();
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = image::Rgba([0, 0, 0, 0]);
        }
        self.texts.clear();
    }

    fn draw_frame(&mut self, frame: &RgbaImage) {
        if frame.dimensions() == self.image.dimensions() {
            self.image.copy_from_slice(frame.as_raw());
        } else {
            imageops::replace(&mut self.image, frame, 0, 0);
        }
        self.texts.clear();
    }

    fn draw_image_scaled(&mut self, image: &RgbaImage) {
        let (width, height) = self.image.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        self.image = if image.dimensions() == (width, height) {
            image.clone()
        } else {
            imageops::resize(image, width, height, FilterType::Triangle)
        };
        self.texts.clear();
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        // Strokes are centered on the rectangle's edge
        let lines = line_width.round().max(1.0) as i32;
        let half = (lines / 2) as f32;
        for i in 0..lines {
            let inset = i as f32 - half;
            if let Some(r) = pixel_rect(
                rect.x + inset,
                rect.y + inset,
                rect.width - 2.0 * inset,
                rect.height - 2.0 * inset,
            ) {
                draw_hollow_rect_mut(&mut self.image, r, color.to_rgba());
            }
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        if let Some(r) = pixel_rect(rect.x, rect.y, rect.width, rect.height) {
            draw_filled_rect_mut(&mut self.image, r, color.to_rgba());
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
        if let Some(font) = label_font() {
            let scale = Scale::uniform(self.font_px);
            // Glyphs are placed by their top edge, `y` is the baseline
            let top = y - font.v_metrics(scale).ascent;
            draw_text_mut(
                &mut self.image,
                color.to_rgba(),
                x.round() as i32,
                top.round() as i32,
                scale,
                font,
                text,
            );
        }
        self.texts.push(TextRun {
            text: text.to_string(),
            x,
            y,
        });
    }

    fn measure_text(&self, text: &str) -> f32 {
        match label_font() {
            Some(font) => text_size(Scale::uniform(self.font_px), font, text).0 as f32,
            None => approx_text_width(text, self.font_px),
        }
    }

    fn set_layer(&mut self, layer: Layer) {
        self.layer = layer;
    }

    fn layer(&self) -> Layer {
        self.layer
    }

    fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, VisionError> {
        encode_rgba_jpeg(&self.image, quality)
    }
}
