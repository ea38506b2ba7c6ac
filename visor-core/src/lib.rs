pub mod error;
pub mod media;
pub mod types;
pub mod wire;

pub use error::{Error, Result};
pub use media::{MediaFile, MediaKind};
pub use types::{
    BoundingBox, CaptureMode, Detection, DetectionResult, DetectionStats, RenderPayload,
    HAZARD_CLASS_ID, LABEL_WITHOUT_HELMET, LABEL_WITH_HELMET,
};
pub use wire::{DetectResponse, SampleListing};
