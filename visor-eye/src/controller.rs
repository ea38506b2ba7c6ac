//! Capture mode controller: owns the single active source and its lifecycle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use visor_core::{CaptureMode, DetectionResult, MediaFile, MediaKind};

use crate::canvas::Canvas;
use crate::client::{DetectRequest, DetectionBackend};
use crate::clock::Clock;
use crate::config::VisorConfig;
use crate::error::VisionError;
use crate::overlay::{OverlayRenderer, RenderTarget};
use crate::pipeline::{FramePipeline, SamplerLoop};
use crate::platform::{
    CameraConstraints, CameraStream, MediaDevices, PermissionState, UserNotifier, VideoLoader,
    VideoSurface,
};
use crate::sampler::FrameSampler;
use crate::session::SourceSession;
use crate::store::{KeyValueStore, PREFERRED_MODE_KEY, WEBCAM_ALLOWED_KEY};

/// What the user asked to capture from
#[derive(Debug, Clone)]
pub enum CaptureRequest {
    UploadImage,
    RecordedVideo(MediaFile),
    Webcam,
}

impl CaptureRequest {
    pub fn mode(&self) -> CaptureMode {
        match self {
            CaptureRequest::UploadImage => CaptureMode::Image,
            CaptureRequest::RecordedVideo(_) => CaptureMode::Video,
            CaptureRequest::Webcam => CaptureMode::Webcam,
        }
    }
}

/// Which source, if any, is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Image,
    RecordedVideo,
    Webcam,
}

impl ControllerState {
    /// Capture mode of the state; `None` when idle
    pub fn mode(self) -> Option<CaptureMode> {
        match self {
            ControllerState::Idle => None,
            ControllerState::Image => Some(CaptureMode::Image),
            ControllerState::RecordedVideo => Some(CaptureMode::Video),
            ControllerState::Webcam => Some(CaptureMode::Webcam),
        }
    }
}

/// Host services the controller talks to
pub struct HostServices {
    pub devices: Arc<dyn MediaDevices>,
    pub video_loader: Arc<dyn VideoLoader>,
    pub store: Arc<dyn KeyValueStore>,
    pub notifier: Arc<dyn UserNotifier>,
    pub clock: Arc<dyn Clock>,
}

enum CaptureSource {
    UploadImage,
    RecordedVideo {
        file_name: String,
        element: Arc<dyn VideoSurface>,
    },
    Webcam {
        stream: Arc<dyn CameraStream>,
        element: Arc<dyn VideoSurface>,
    },
}

struct ActiveSource {
    source: CaptureSource,
    session: Arc<SourceSession>,
    pipeline: Option<Arc<FramePipeline>>,
    sampler_loop: Option<SamplerLoop>,
}

impl ActiveSource {
    fn state(&self) -> ControllerState {
        match self.source {
            CaptureSource::UploadImage => ControllerState::Image,
            CaptureSource::RecordedVideo { .. } => ControllerState::RecordedVideo,
            CaptureSource::Webcam { .. } => ControllerState::Webcam,
        }
    }
}

/// Owns the single active capture source and switches between them.
///
/// At most one source is active. Activating another tears the current one
/// down first: its session is closed, its loop stopped, its camera released
/// and the canvas reset, so nothing it started can draw afterwards.
pub struct CaptureModeController {
    config: VisorConfig,
    backend: Arc<dyn DetectionBackend>,
    host: HostServices,
    target: RenderTarget,
    annotated: Arc<AtomicBool>,
    active: Mutex<Option<ActiveSource>>,
}

impl CaptureModeController {
    /// Build a controller after validating `config`.
    ///
    /// Starts idle; call [`restore`](Self::restore) to reopen the preferred mode.
    pub fn new(
        config: VisorConfig,
        backend: Arc<dyn DetectionBackend>,
        host: HostServices,
        canvas: Box<dyn Canvas>,
    ) -> Result<Self, VisionError> {
        config.validate().map_err(VisionError::Config)?;
        let annotated = Arc::new(AtomicBool::new(config.annotated));

        Ok(Self {
            config,
            backend,
            host,
            target: RenderTarget::new(canvas, OverlayRenderer::default()),
            annotated,
            active: Mutex::new(None),
        })
    }

    /// Canvas results are drawn on
    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// Whether streaming frames ask for server-annotated images
    pub fn set_annotated(&self, annotated: bool) {
        self.annotated.store(annotated, Ordering::Relaxed);
    }

    pub fn annotated(&self) -> bool {
        self.annotated.load(Ordering::Relaxed)
    }

    /// Current state; `Idle` when no source is active
    pub async fn state(&self) -> ControllerState {
        self.active
            .lock()
            .await
            .as_ref()
            .map(ActiveSource::state)
            .unwrap_or(ControllerState::Idle)
    }

    /// Session of the active source
    pub async fn active_session(&self) -> Option<Arc<SourceSession>> {
        self.active.lock().await.as_ref().map(|a| Arc::clone(&a.session))
    }

    /// Whether the detection loop of the active source is running
    pub async fn is_detecting(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .and_then(|a| a.sampler_loop.as_ref())
            .map(SamplerLoop::is_running)
            .unwrap_or(false)
    }

    /// Result of the last camera acquisition, if one was ever attempted
    pub fn webcam_allowed(&self) -> Option<bool> {
        match self.host.store.get(WEBCAM_ALLOWED_KEY) {
            Ok(value) => value.map(|v| v == "true"),
            Err(e) => {
                warn!("Failed to read camera preference: {}", e);
                None
            }
        }
    }

    /// Switch to `request`, tearing down whatever source is active first.
    ///
    /// Re-activating the image or webcam mode that is already active is a
    /// no-op. A rejected request leaves the current source untouched.
    pub async fn activate(&self, request: CaptureRequest) -> Result<(), VisionError> {
        let mut active = self.active.lock().await;
        let mode = request.mode();

        match (active.as_ref().map(ActiveSource::state), &request) {
            (Some(ControllerState::Image), CaptureRequest::UploadImage)
            | (Some(ControllerState::Webcam), CaptureRequest::Webcam) => return Ok(()),
            _ => {}
        }

        match request {
            CaptureRequest::UploadImage => {
                self.teardown(active.take());
                *active = Some(ActiveSource {
                    source: CaptureSource::UploadImage,
                    session: SourceSession::new(CaptureMode::Image),
                    pipeline: None,
                    sampler_loop: None,
                });
            }
            CaptureRequest::RecordedVideo(file) => {
                if file.ensure_kind(MediaKind::Video).is_err() {
                    return Err(self.reject(VisionError::InvalidFile { expected: "a video" }));
                }
                self.teardown(active.take());

                let element = match self.host.video_loader.load(&file) {
                    Ok(element) => element,
                    Err(e) => return Err(self.reject(e)),
                };
                element.set_playback_rate(self.config.video.playback_rate);
                if let Err(e) = element.play() {
                    return Err(self.reject(e));
                }
                info!("Loaded video {} ({} bytes)", file.name, file.bytes.len());

                let session = SourceSession::new(CaptureMode::Video);
                let (pipeline, sampler_loop) =
                    self.start_stream(&session, &element, self.config.video.jpeg_quality);
                *active = Some(ActiveSource {
                    source: CaptureSource::RecordedVideo {
                        file_name: file.name,
                        element,
                    },
                    session,
                    pipeline: Some(pipeline),
                    sampler_loop: Some(sampler_loop),
                });
            }
            CaptureRequest::Webcam => {
                if self.host.devices.permission_state().await == PermissionState::Denied {
                    return Err(self.reject(VisionError::PermissionBlocked));
                }
                self.teardown(active.take());

                let constraints = CameraConstraints::from(&self.config.webcam);
                let stream = match self.host.devices.open_camera(&constraints).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        self.store(WEBCAM_ALLOWED_KEY, "false");
                        error!("Error accessing webcam: {}", e);
                        return Err(self.reject(e.into()));
                    }
                };
                self.store(WEBCAM_ALLOWED_KEY, "true");

                let element = stream.surface();
                if let Err(e) = element.play() {
                    stream.stop_tracks();
                    return Err(self.reject(e));
                }
                let (width, height) = element.dimensions();
                info!("Webcam started ({}x{})", width, height);

                let session = SourceSession::new(CaptureMode::Webcam);
                let (pipeline, sampler_loop) =
                    self.start_stream(&session, &element, self.config.webcam.jpeg_quality);
                *active = Some(ActiveSource {
                    source: CaptureSource::Webcam { stream, element },
                    session,
                    pipeline: Some(pipeline),
                    sampler_loop: Some(sampler_loop),
                });
            }
        }

        self.store(PREFERRED_MODE_KEY, mode.as_str());
        Ok(())
    }

    /// Tear down the active source and go idle
    pub async fn deactivate(&self) {
        let mut active = self.active.lock().await;
        self.teardown(active.take());
    }

    /// Stop the camera and fall back to image mode
    pub async fn stop_webcam(&self) -> Result<(), VisionError> {
        self.activate(CaptureRequest::UploadImage).await
    }

    /// Unload the video and fall back to image mode
    pub async fn close_video(&self) -> Result<(), VisionError> {
        self.activate(CaptureRequest::UploadImage).await
    }

    /// Pause or resume detection on the loaded video.
    ///
    /// Returns whether detection is running afterwards.
    pub async fn toggle_video_detection(&self) -> Result<bool, VisionError> {
        let mut guard = self.active.lock().await;
        let active = match guard.as_mut() {
            Some(active) => active,
            None => return Err(VisionError::InvalidState("No video loaded".to_string())),
        };
        let element = match &active.source {
            CaptureSource::RecordedVideo { element, .. } => Arc::clone(element),
            _ => return Err(VisionError::InvalidState("No video loaded".to_string())),
        };

        match active.sampler_loop.take() {
            Some(sampler_loop) if sampler_loop.is_running() => {
                sampler_loop.stop();
                element.pause();
                info!("Video detection paused");
                Ok(false)
            }
            _ => {
                element.set_playback_rate(self.config.video.playback_rate);
                element.play()?;
                if let Some(pipeline) = &active.pipeline {
                    active.sampler_loop = Some(SamplerLoop::spawn(
                        Arc::clone(pipeline),
                        self.config.sampling.tick_period(),
                    ));
                }
                info!("Video detection resumed");
                Ok(true)
            }
        }
    }

    /// React to a camera permission change reported by the host.
    ///
    /// Returns whether an active webcam was torn down.
    pub async fn on_permission_change(&self, state: PermissionState) -> bool {
        if state != PermissionState::Denied {
            return false;
        }

        let mut active = self.active.lock().await;
        if !matches!(active.as_ref().map(ActiveSource::state), Some(ControllerState::Webcam)) {
            return false;
        }
        warn!("Camera permission revoked while streaming");
        self.teardown(active.take());
        self.store(WEBCAM_ALLOWED_KEY, "false");
        self.host.notifier.alert(&VisionError::PermissionRevoked.user_message());
        true
    }

    /// Run detection on an uploaded image and present the annotated result
    pub async fn analyze_image(&self, file: &MediaFile) -> Result<DetectionResult, VisionError> {
        let session = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(a) if a.state() == ControllerState::Image => Arc::clone(&a.session),
                _ => {
                    return Err(VisionError::InvalidState(
                        "Image analysis requires image mode".to_string(),
                    ))
                }
            }
        };
        if file.ensure_kind(MediaKind::Image).is_err() {
            return Err(self.reject(VisionError::InvalidFile { expected: "an image" }));
        }

        let result = match self.backend.detect(DetectRequest::upload(file)).await {
            Ok(result) => result,
            Err(e) => {
                error!("Image analysis failed: {}", e);
                return Err(self.reject(e));
            }
        };
        info!(
            "Detected {} objects in {} ({} with helmet, {} without)",
            result.stats.total, file.name, result.stats.with_helmet, result.stats.without_helmet
        );

        match image::load_from_memory(&file.bytes) {
            Ok(image) => {
                if let Err(e) = self.target.present_upload(&session, &image.to_rgba8(), &result) {
                    warn!("Failed to present {}: {}", file.name, e);
                }
            }
            Err(e) => warn!("Could not decode {} for display: {}", file.name, e),
        }
        Ok(result)
    }

    /// Re-enter the persisted preferred mode.
    ///
    /// A stored video mode is only reported back, since there is no file to
    /// reopen.
    pub async fn restore(&self) -> Result<Option<CaptureMode>, VisionError> {
        let stored = match self.host.store.get(PREFERRED_MODE_KEY) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read preferred mode: {}", e);
                None
            }
        };
        let mode = match stored.and_then(|s| s.parse::<CaptureMode>().ok()) {
            Some(mode) => mode,
            None => return Ok(None),
        };

        match mode {
            CaptureMode::Image => self.activate(CaptureRequest::UploadImage).await?,
            CaptureMode::Webcam => self.activate(CaptureRequest::Webcam).await?,
            CaptureMode::Video => {}
        }
        Ok(Some(mode))
    }

    fn start_stream(
        &self,
        session: &Arc<SourceSession>,
        element: &Arc<dyn VideoSurface>,
        jpeg_quality: u8,
    ) -> (Arc<FramePipeline>, SamplerLoop) {
        let pipeline = Arc::new(FramePipeline::new(
            Arc::clone(session),
            Arc::clone(element),
            FrameSampler::new(&self.config.sampling, Arc::clone(&self.host.clock)),
            Arc::clone(&self.backend),
            self.target.clone(),
            jpeg_quality,
            Arc::clone(&self.annotated),
        ));
        let sampler_loop =
            SamplerLoop::spawn(Arc::clone(&pipeline), self.config.sampling.tick_period());
        info!("Started {} detection ({})", session.mode(), session.id());
        (pipeline, sampler_loop)
    }

    fn teardown(&self, active: Option<ActiveSource>) {
        let Some(active) = active else {
            return;
        };

        // Close first so in-flight work sees the source as dead
        active.session.close();
        if let Some(sampler_loop) = active.sampler_loop {
            sampler_loop.stop();
        }
        match &active.source {
            CaptureSource::UploadImage => {}
            CaptureSource::RecordedVideo { file_name, element } => {
                element.pause();
                info!("Closed video {}", file_name);
            }
            CaptureSource::Webcam { stream, element } => {
                stream.stop_tracks();
                element.pause();
                info!("Webcam stopped");
            }
        }
        self.target.reset();
        info!("Deactivated {} ({})", active.session.mode(), active.session.id());
    }

    fn reject(&self, err: VisionError) -> VisionError {
        self.host.notifier.alert(&err.user_message());
        err
    }

    fn store(&self, key: &str, value: &str) {
        if let Err(e) = self.host.store.set(key, value) {
            warn!("Failed to persist {}: {}", key, e);
        }
    }
}
