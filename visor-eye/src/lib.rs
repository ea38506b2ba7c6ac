//! visor-eye: real-time detection client for visor
//!
//! Samples frames from an uploaded image, a recorded video or a live webcam,
//! sends them to the detection service and draws the returned boxes onto an
//! overlay canvas.
//!
//! Only one capture source is active at a time. Each source carries its own
//! frame budget and at most one request in flight; results that arrive after
//! their source was torn down are dropped.

pub mod canvas;
pub mod client;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod overlay;
pub mod pipeline;
pub mod platform;
pub mod sampler;
pub mod session;
pub mod store;

pub use canvas::{Canvas, RasterCanvas, RecordingCanvas};
pub use client::{DetectRequest, DetectionBackend, HttpDetectionClient};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::VisorConfig;
pub use controller::{CaptureModeController, CaptureRequest, ControllerState, HostServices};
pub use error::{ErrorCategory, VisionError};
pub use gate::{DispatchOutcome, FlightPermit};
pub use overlay::{OverlayRenderer, RenderTarget};
pub use pipeline::{FramePipeline, SamplerLoop};
pub use platform::{
    CameraStream, LogNotifier, MediaDevices, MediaError, NoCamera, PermissionState, UserNotifier,
    VideoLoader, VideoSurface,
};
pub use sampler::{FrameSampler, TickOutcome};
pub use session::{FrameBudget, LivenessToken, SourceId, SourceSession};
pub use store::{FileStore, KeyValueStore, MemoryStore};
