//! Fakes shared by the visor-eye integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use image::{ImageEncoder, Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use visor_core::{BoundingBox, Detection, DetectionResult, MediaFile};
use visor_eye::platform::CameraConstraints;
use visor_eye::store::{KeyValueStore, MemoryStore};
use visor_eye::{
    CameraStream, CaptureModeController, Clock, DetectRequest, DetectionBackend, HostServices,
    MediaDevices, MediaError, MonotonicClock, PermissionState, RecordingCanvas, UserNotifier,
    VideoLoader, VideoSurface, VisionError, VisorConfig,
};

pub struct FakeVideo {
    width: u32,
    height: u32,
    paused: AtomicBool,
    rate: Mutex<f32>,
    plays: AtomicUsize,
}

impl FakeVideo {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            paused: AtomicBool::new(true),
            rate: Mutex::new(1.0),
            plays: AtomicUsize::new(0),
        })
    }

    pub fn playback_rate(&self) -> f32 {
        *self.rate.lock()
    }

    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

impl VideoSurface for FakeVideo {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn play(&self) -> Result<(), VisionError> {
        self.paused.store(false, Ordering::SeqCst);
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn set_playback_rate(&self, rate: f32) {
        *self.rate.lock() = rate;
    }

    fn snapshot(&self) -> Option<RgbaImage> {
        Some(RgbaImage::from_pixel(self.width, self.height, Rgba([90, 90, 90, 255])))
    }
}

pub struct FakeCamera {
    element: Arc<FakeVideo>,
    live: AtomicUsize,
}

impl FakeCamera {
    pub fn element(&self) -> &Arc<FakeVideo> {
        &self.element
    }
}

impl CameraStream for FakeCamera {
    fn surface(&self) -> Arc<dyn VideoSurface> {
        self.element.clone()
    }

    fn stop_tracks(&self) {
        self.live.store(0, Ordering::SeqCst);
    }

    fn live_tracks(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct FakeDevices {
    permission: Mutex<PermissionState>,
    failure: Mutex<Option<MediaError>>,
    cameras: Mutex<Vec<Arc<FakeCamera>>>,
    open_calls: AtomicUsize,
}

impl FakeDevices {
    pub fn new(permission: PermissionState) -> Arc<Self> {
        Arc::new(Self {
            permission: Mutex::new(permission),
            failure: Mutex::new(None),
            cameras: Mutex::new(Vec::new()),
            open_calls: AtomicUsize::new(0),
        })
    }

    pub fn fail_with(&self, error: MediaError) {
        *self.failure.lock() = Some(error);
    }

    pub fn set_permission(&self, permission: PermissionState) {
        *self.permission.lock() = permission;
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn cameras(&self) -> Vec<Arc<FakeCamera>> {
        self.cameras.lock().clone()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn permission_state(&self) -> PermissionState {
        *self.permission.lock()
    }

    async fn open_camera(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Arc<dyn CameraStream>, MediaError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        let camera = Arc::new(FakeCamera {
            element: FakeVideo::new(constraints.width, constraints.height),
            live: AtomicUsize::new(1),
        });
        self.cameras.lock().push(camera.clone());
        Ok(camera)
    }
}

#[derive(Default)]
pub struct FakeLoader {
    loaded: Mutex<Vec<Arc<FakeVideo>>>,
}

impl FakeLoader {
    pub fn videos(&self) -> Vec<Arc<FakeVideo>> {
        self.loaded.lock().clone()
    }
}

impl VideoLoader for FakeLoader {
    fn load(&self, _file: &MediaFile) -> Result<Arc<dyn VideoSurface>, VisionError> {
        let video = FakeVideo::new(64, 48);
        self.loaded.lock().push(video.clone());
        Ok(video)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().clone()
    }
}

impl UserNotifier for RecordingNotifier {
    fn alert(&self, message: &str) {
        self.alerts.lock().push(message.to_string());
    }
}

type Reply = oneshot::Sender<Result<DetectionResult, VisionError>>;

/// Backend whose responses are released by the test
#[derive(Default)]
pub struct ScriptedBackend {
    requests: Mutex<Vec<DetectRequest>>,
    pending: Mutex<VecDeque<Reply>>,
    auto_reply: Mutex<Option<DetectionResult>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every request immediately with `result`
    pub fn replying(result: DetectionResult) -> Arc<Self> {
        let backend = Self::default();
        *backend.auto_reply.lock() = Some(result);
        Arc::new(backend)
    }

    pub fn requests(&self) -> Vec<DetectRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Settle the oldest pending request; false if it was already abandoned
    pub fn resolve_next(&self, result: Result<DetectionResult, VisionError>) -> bool {
        match self.pending.lock().pop_front() {
            Some(reply) => reply.send(result).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl DetectionBackend for ScriptedBackend {
    async fn detect(&self, request: DetectRequest) -> Result<DetectionResult, VisionError> {
        self.requests.lock().push(request);
        if let Some(result) = self.auto_reply.lock().clone() {
            return Ok(result);
        }
        let (tx, rx) = oneshot::channel();
        self.pending.lock().push_back(tx);
        rx.await
            .unwrap_or_else(|_| Err(VisionError::InvalidState("reply dropped".to_string())))
    }
}

pub struct Harness {
    pub controller: CaptureModeController,
    pub backend: Arc<ScriptedBackend>,
    pub devices: Arc<FakeDevices>,
    pub loader: Arc<FakeLoader>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<MemoryStore>,
    pub canvas: RecordingCanvas,
}

pub fn harness(permission: PermissionState) -> Harness {
    harness_with(permission, ScriptedBackend::new(), Arc::new(MonotonicClock::new()))
}

pub fn harness_with(
    permission: PermissionState,
    backend: Arc<ScriptedBackend>,
    clock: Arc<dyn Clock>,
) -> Harness {
    let devices = FakeDevices::new(permission);
    let loader = Arc::new(FakeLoader::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(MemoryStore::new());
    let canvas = RecordingCanvas::new();

    let host = HostServices {
        devices: devices.clone(),
        video_loader: loader.clone(),
        store: store.clone(),
        notifier: notifier.clone(),
        clock,
    };
    let controller = CaptureModeController::new(
        VisorConfig::default(),
        backend.clone(),
        host,
        Box::new(canvas.clone()),
    )
    .unwrap();

    Harness {
        controller,
        backend,
        devices,
        loader,
        notifier,
        store,
        canvas,
    }
}

pub fn stored(store: &MemoryStore, key: &str) -> Option<String> {
    store.get(key).unwrap()
}

pub fn detection(label: &str, confidence: f32, class_id: u32) -> Detection {
    Detection {
        label: label.to_string(),
        confidence,
        bbox: BoundingBox::new(12.0, 30.0, 40.0, 44.0),
        class_id,
    }
}

pub fn video_file() -> MediaFile {
    MediaFile::new("site.mp4", "video/mp4", vec![0u8; 32])
}

pub fn png_file(width: u32, height: u32) -> MediaFile {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 255]));
    let mut bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut bytes)
        .write_image(image.as_raw(), width, height, image::ColorType::Rgba8)
        .unwrap();
    MediaFile::new("site.png", "image/png", bytes)
}

/// Let spawned tasks run; moves a paused clock by one millisecond
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
