//! Overlay rendering of detection results

use image::RgbaImage;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;
use visor_core::{Detection, DetectionResult, RenderPayload};

use crate::canvas::{Canvas, Color, Layer, Rect};
use crate::error::VisionError;
use crate::session::{LivenessToken, SourceSession};

/// Box colors per detection class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub hazard: Color,
    pub safe: Color,
    pub text: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            hazard: Color::rgb(220, 20, 60),
            safe: Color::rgb(0, 200, 0),
            text: Color::WHITE,
        }
    }
}

impl Palette {
    /// Box and chip color for `detection`
    pub fn color_for(&self, detection: &Detection) -> Color {
        if detection.is_hazard() {
            self.hazard
        } else {
            self.safe
        }
    }
}

/// Geometry of boxes and their label chips
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelStyle {
    pub line_width: f32,
    pub text_height: f32,
    /// Chip height beyond the text height
    pub chip_padding: f32,
    /// Horizontal inset of the text inside its chip
    pub text_inset: f32,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            line_width: 3.0,
            text_height: 18.0,
            chip_padding: 6.0,
            text_inset: 4.0,
        }
    }
}

/// Text shown above a detection box
pub fn label_text(detection: &Detection) -> String {
    let label = if detection.label.is_empty() {
        "obj"
    } else {
        detection.label.as_str()
    };
    format!("{} {}%", label, detection.confidence_percent())
}

/// Draws detection results onto a [`Canvas`]: either the server-annotated
/// image or locally drawn boxes with label chips
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    palette: Palette,
    style: LabelStyle,
}

impl OverlayRenderer {
    pub fn new(palette: Palette, style: LabelStyle) -> Self {
        Self { palette, style }
    }

    /// Render `result` onto a canvas that already holds the sent frame
    pub fn render(&self, canvas: &mut dyn Canvas, result: &DetectionResult) -> Result<(), VisionError> {
        match result.payload() {
            RenderPayload::AnnotatedImage(bytes) => {
                let image = image::load_from_memory(bytes)?.to_rgba8();
                self.render_annotated(canvas, &image);
            }
            RenderPayload::Boxes(detections) => self.render_boxes(canvas, detections),
        }
        canvas.set_layer(Layer::Overlay);
        Ok(())
    }

    /// Replace the canvas contents with a server-annotated image
    pub fn render_annotated(&self, canvas: &mut dyn Canvas, image: &RgbaImage) {
        canvas.clear();
        canvas.draw_image_scaled(image);
    }

    /// Draw boxes and labels over the current canvas contents
    pub fn render_boxes(&self, canvas: &mut dyn Canvas, detections: &[Detection]) {
        for detection in detections {
            let color = self.palette.color_for(detection);
            let bbox = detection.bbox;
            canvas.stroke_rect(
                Rect::new(bbox.x1, bbox.y1, bbox.width(), bbox.height()),
                color,
                self.style.line_width,
            );

            let text = label_text(detection);
            let text_width = canvas.measure_text(&text);
            let chip_height = self.style.text_height + self.style.chip_padding;
            canvas.fill_rect(
                Rect::new(
                    bbox.x1,
                    (bbox.y1 - chip_height).max(0.0),
                    text_width + 2.0 * self.style.text_inset,
                    chip_height,
                ),
                color,
            );
            canvas.fill_text(
                &text,
                bbox.x1 + self.style.text_inset,
                (bbox.y1 - self.style.chip_padding).max(self.style.text_height),
                self.palette.text,
            );
        }
    }
}

/// Canvas shared by a capture source and its detection results
#[derive(Clone)]
pub struct RenderTarget {
    canvas: Arc<Mutex<Box<dyn Canvas>>>,
    renderer: OverlayRenderer,
}

impl RenderTarget {
    /// Wrap `canvas`; it starts on the live video layer
    pub fn new(canvas: Box<dyn Canvas>, renderer: OverlayRenderer) -> Self {
        Self {
            canvas: Arc::new(Mutex::new(canvas)),
            renderer,
        }
    }

    pub fn renderer(&self) -> &OverlayRenderer {
        &self.renderer
    }

    /// Layer currently shown to the user
    pub fn layer(&self) -> Layer {
        self.canvas.lock().layer()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.lock().dimensions()
    }

    /// Run `f` with exclusive access to the canvas
    pub fn with_canvas<R>(&self, f: impl FnOnce(&mut dyn Canvas) -> R) -> R {
        let mut canvas = self.canvas.lock();
        f(&mut **canvas)
    }

    /// Copy `frame` into the canvas at its native size and encode it.
    ///
    /// Returns `None` without touching the canvas if `session` is closed.
    pub fn capture(
        &self,
        session: &SourceSession,
        frame: &RgbaImage,
        quality: u8,
    ) -> Result<Option<Vec<u8>>, VisionError> {
        let mut canvas = self.canvas.lock();
        if !session.is_live() {
            return Ok(None);
        }
        let (width, height) = frame.dimensions();
        if canvas.dimensions() != (width, height) {
            canvas.resize(width, height);
        }
        canvas.draw_frame(frame);
        canvas.encode_jpeg(quality).map(Some)
    }

    /// Render `result` unless `session` was closed or the sampling `run`
    /// that sent it was stopped in the meantime.
    ///
    /// Liveness is checked under the canvas lock, so a teardown that clears
    /// the canvas can never be followed by a stale draw.
    pub fn render_if_live(
        &self,
        session: &SourceSession,
        run: &LivenessToken,
        result: &DetectionResult,
    ) -> Result<bool, VisionError> {
        // Decode outside the lock
        let annotated = match result.payload() {
            RenderPayload::AnnotatedImage(bytes) => Some(image::load_from_memory(bytes)?.to_rgba8()),
            RenderPayload::Boxes(_) => None,
        };

        let mut canvas = self.canvas.lock();
        if !session.is_live() {
            debug!("Discarding result for closed {}", session.id());
            return Ok(false);
        }
        if !run.is_live() {
            debug!("Discarding result for stopped run of {}", session.id());
            return Ok(false);
        }
        match &annotated {
            Some(image) => self.renderer.render_annotated(&mut **canvas, image),
            None => self.renderer.render_boxes(&mut **canvas, &result.detections),
        }
        canvas.set_layer(Layer::Overlay);
        Ok(true)
    }

    /// Clear the canvas and show the live video again
    pub fn reset(&self) {
        let mut canvas = self.canvas.lock();
        canvas.clear();
        canvas.set_layer(Layer::LiveVideo);
    }

    /// Render a one-shot result (uploaded image) on a canvas sized to `image`
    pub fn present_upload(
        &self,
        session: &SourceSession,
        image: &RgbaImage,
        result: &DetectionResult,
    ) -> Result<(), VisionError> {
        let mut canvas = self.canvas.lock();
        if !session.is_live() {
            return Ok(());
        }
        let (width, height) = image.dimensions();
        canvas.resize(width, height);
        canvas.draw_frame(image);
        self.renderer.render(&mut **canvas, result)
    }
}
