use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Label the detector assigns to a worker wearing a helmet
pub const LABEL_WITH_HELMET: &str = "With Helmet";
/// Label the detector assigns to a worker without a helmet
pub const LABEL_WITHOUT_HELMET: &str = "Without Helmet";
/// Class id of the hazard class ("Without Helmet")
pub const HAZARD_CLASS_ID: u32 = 1;

/// Capture mode selectable by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Still image upload, analysed on explicit request
    Image,
    /// Recorded video file played back locally
    Video,
    /// Live camera feed
    Webcam,
}

impl CaptureMode {
    pub const ALL: [CaptureMode; 3] = [CaptureMode::Image, CaptureMode::Video, CaptureMode::Webcam];

    /// Value sent in the `mode` form field and stored as the preferred mode
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Image => "image",
            CaptureMode::Video => "video",
            CaptureMode::Webcam => "webcam",
        }
    }

    /// Whether the mode feeds the continuous frame sampler
    pub fn is_streaming(&self) -> bool {
        !matches!(self, CaptureMode::Image)
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(CaptureMode::Image),
            "video" => Ok(CaptureMode::Video),
            "webcam" => Ok(CaptureMode::Webcam),
            other => Err(Error::InvalidInput(format!("Unknown capture mode: {}", other))),
        }
    }
}

/// Axis-aligned box in source-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// A single detection returned by the endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub confidence: f32,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub class_id: u32,
}

impl Detection {
    /// Whether this detection is a person without a helmet
    pub fn is_hazard(&self) -> bool {
        self.class_id == HAZARD_CLASS_ID
    }

    /// Confidence as a whole percentage, clamped to 0..=100
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u32
    }
}

/// Per-result counts by label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub total: u32,
    pub with_helmet: u32,
    pub without_helmet: u32,
}

impl DetectionStats {
    /// Count helmet classes in `detections`
    pub fn from_detections(detections: &[Detection]) -> Self {
        let with_helmet = detections.iter().filter(|d| d.label == LABEL_WITH_HELMET).count() as u32;
        let without_helmet = detections.iter().filter(|d| d.label == LABEL_WITHOUT_HELMET).count() as u32;
        Self {
            total: detections.len() as u32,
            with_helmet,
            without_helmet,
        }
    }
}

/// Normalized outcome of one detection request.
///
/// When `annotated_image` is present it is authoritative for rendering and the
/// detections are informational only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionResult {
    pub annotated_image: Option<Vec<u8>>,
    pub detections: Vec<Detection>,
    pub stats: DetectionStats,
}

/// What a renderer should draw for a result
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderPayload<'a> {
    AnnotatedImage(&'a [u8]),
    Boxes(&'a [Detection]),
}

impl DetectionResult {
    /// Result without an annotated image, stats derived from `detections`
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        let stats = DetectionStats::from_detections(&detections);
        Self {
            annotated_image: None,
            detections,
            stats,
        }
    }

    /// What should be drawn: the annotated image when present, boxes otherwise
    pub fn payload(&self) -> RenderPayload<'_> {
        match &self.annotated_image {
            Some(bytes) => RenderPayload::AnnotatedImage(bytes),
            None => RenderPayload::Boxes(&self.detections),
        }
    }
}
