//! Host platform seams: video elements, camera access and user alerts

use async_trait::async_trait;
use image::RgbaImage;
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use visor_core::MediaFile;

use crate::config::WebcamConfig;
use crate::error::VisionError;

/// A frame-producing element (a `<video>` playing a file or a camera stream)
pub trait VideoSurface: Send + Sync {
    /// Intrinsic frame size; `(0, 0)` until metadata is available
    fn dimensions(&self) -> (u32, u32);

    fn is_paused(&self) -> bool;

    fn play(&self) -> Result<(), VisionError>;

    fn pause(&self);

    fn set_playback_rate(&self, rate: f32);

    /// Pixel copy of the frame currently displayed
    fn snapshot(&self) -> Option<RgbaImage>;

    /// Whether the element currently produces frames worth sampling
    fn is_producing(&self) -> bool {
        let (width, height) = self.dimensions();
        width > 0 && height > 0 && !self.is_paused()
    }
}

/// A live camera stream bound to a video element
pub trait CameraStream: Send + Sync {
    /// The element the stream is attached to
    fn surface(&self) -> Arc<dyn VideoSurface>;

    /// Stop every media track and detach the stream from its element
    fn stop_tracks(&self);

    /// Number of tracks still delivering media
    fn live_tracks(&self) -> usize;
}

/// Result of a camera permission query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Unknown or not yet asked; also used when the platform cannot be queried
    Prompt,
}

impl PermissionState {
    /// Parse a host permission string; anything unrecognized counts as `Prompt`
    pub fn parse(state: &str) -> Self {
        match state {
            "granted" => PermissionState::Granted,
            "denied" => PermissionState::Denied,
            _ => PermissionState::Prompt,
        }
    }
}

/// Requested camera capabilities; the platform treats them as ideals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl From<&WebcamConfig> for CameraConstraints {
    fn from(config: &WebcamConfig) -> Self {
        Self {
            width: config.ideal_width,
            height: config.ideal_height,
            frame_rate: config.ideal_frame_rate,
        }
    }
}

/// Camera acquisition failure as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// `NotAllowedError` / `PermissionDeniedError`
    NotAllowed,
    NotFound,
    NotReadable(String),
    Other(String),
}

impl MediaError {
    /// Classify a DOMException-style error name
    pub fn from_name(name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" => MediaError::NotAllowed,
            "NotFoundError" | "DevicesNotFoundError" => MediaError::NotFound,
            "NotReadableError" | "TrackStartError" => MediaError::NotReadable(message.to_string()),
            _ => MediaError::Other(message.to_string()),
        }
    }
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::NotAllowed => f.write_str("permission denied"),
            MediaError::NotFound => f.write_str("Requested device not found"),
            MediaError::NotReadable(msg) | MediaError::Other(msg) => f.write_str(msg),
        }
    }
}

impl From<MediaError> for VisionError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotAllowed => VisionError::PermissionDenied,
            other => VisionError::CameraUnavailable(other.to_string()),
        }
    }
}

/// Camera access of the host
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn permission_state(&self) -> PermissionState;

    async fn open_camera(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Arc<dyn CameraStream>, MediaError>;
}

/// Devices of a host without any camera
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

#[async_trait]
impl MediaDevices for NoCamera {
    async fn permission_state(&self) -> PermissionState {
        PermissionState::Prompt
    }

    async fn open_camera(
        &self,
        _constraints: &CameraConstraints,
    ) -> Result<Arc<dyn CameraStream>, MediaError> {
        Err(MediaError::NotFound)
    }
}

/// Binds a selected video file to a playable element
pub trait VideoLoader: Send + Sync {
    fn load(&self, file: &MediaFile) -> Result<Arc<dyn VideoSurface>, VisionError>;
}

/// Surfaces blocking messages to the user
pub trait UserNotifier: Send + Sync {
    fn alert(&self, message: &str);
}

/// Notifier for headless hosts: alerts go to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl UserNotifier for LogNotifier {
    fn alert(&self, message: &str) {
        warn!("{}", message);
    }
}
