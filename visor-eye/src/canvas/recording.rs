use image::RgbaImage;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{approx_text_width, encode_rgba_jpeg, Canvas, Color, Layer, Rect};
use crate::error::VisionError;

/// A drawing call observed by [`RecordingCanvas`]
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Resize { width: u32, height: u32 },
    Clear,
    DrawFrame { width: u32, height: u32 },
    DrawImage { width: u32, height: u32 },
    StrokeRect { rect: Rect, color: Color, line_width: f32 },
    FillRect { rect: Rect, color: Color },
    FillText { text: String, x: f32, y: f32, color: Color },
    SetLayer(Layer),
}

#[derive(Debug, Default)]
struct RecordingState {
    width: u32,
    height: u32,
    layer: Layer,
    last_frame: Option<RgbaImage>,
    commands: Vec<DrawCommand>,
}

/// Canvas that records every call instead of painting.
///
/// Clones share the same log, so a handle can be kept after the canvas is
/// handed to a renderer.
#[derive(Debug, Clone, Default)]
pub struct RecordingCanvas {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, oldest first
    pub fn commands(&self) -> Vec<DrawCommand> {
        self.state.lock().commands.clone()
    }

    /// Drain the log
    pub fn take_commands(&self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.state.lock().commands)
    }

    /// Strings passed to `fill_text`, in order
    pub fn texts(&self) -> Vec<String> {
        self.state
            .lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::FillText { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, command: DrawCommand) {
        self.state.lock().commands.push(command);
    }
}

impl Canvas for RecordingCanvas {
    fn dimensions(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.width = width;
        state.height = height;
        state.last_frame = None;
        state.commands.push(DrawCommand::Resize { width, height });
    }

    fn clear(&mut self) {
        self.record(DrawCommand::Clear);
    }

    fn draw_frame(&mut self, frame: &RgbaImage) {
        let mut state = self.state.lock();
        let (width, height) = frame.dimensions();
        state.last_frame = Some(frame.clone());
        state.commands.push(DrawCommand::DrawFrame { width, height });
    }

    fn draw_image_scaled(&mut self, image: &RgbaImage) {
        let (width, height) = image.dimensions();
        self.record(DrawCommand::DrawImage { width, height });
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        self.record(DrawCommand::StrokeRect { rect, color, line_width });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.record(DrawCommand::FillRect { rect, color });
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
        self.record(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }

    fn measure_text(&self, text: &str) -> f32 {
        approx_text_width(text, 16.0)
    }

    fn set_layer(&mut self, layer: Layer) {
        let mut state = self.state.lock();
        state.layer = layer;
        state.commands.push(DrawCommand::SetLayer(layer));
    }

    fn layer(&self) -> Layer {
        self.state.lock().layer
    }

    fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, VisionError> {
        let state = self.state.lock();
        match &state.last_frame {
            Some(frame) => encode_rgba_jpeg(frame, quality),
            None => encode_rgba_jpeg(&RgbaImage::new(state.width, state.height), quality),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_log() {
        let handle = RecordingCanvas::new();
        let mut boxed: Box<dyn Canvas> = Box::new(handle.clone());
        boxed.resize(4, 2);
        boxed.fill_text("hi", 1.0, 2.0, Color::WHITE);
        boxed.set_layer(Layer::Overlay);

        assert_eq!(handle.dimensions(), (4, 2));
        assert_eq!(handle.layer(), Layer::Overlay);
        assert_eq!(handle.texts(), vec!["hi".to_string()]);
        assert_eq!(handle.take_commands().len(), 3);
        assert!(handle.commands().is_empty());
    }

    #[test]
    fn test_encode_uses_last_frame() {
        let mut canvas = RecordingCanvas::new();
        canvas.resize(6, 6);
        canvas.draw_frame(&RgbaImage::from_pixel(6, 6, image::Rgba([1, 2, 3, 255])));
        let jpeg = canvas.encode_jpeg(50).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }
}
