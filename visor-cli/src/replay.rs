// Recorded-video replay from a directory of still frames

use anyhow::{bail, Context};
use bytes::Bytes;
use image::RgbaImage;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use visor_core::{DetectionResult, MediaFile, MediaKind};
use visor_eye::canvas::{Color, Layer, Rect};
use visor_eye::store::MemoryStore;
use visor_eye::{
    Canvas, CaptureModeController, CaptureRequest, DetectRequest, DetectionBackend, HostServices,
    LogNotifier, MonotonicClock, NoCamera, RasterCanvas, VideoLoader, VideoSurface, VisionError,
    VisorConfig,
};

struct Playback {
    rate: f32,
    paused: bool,
    position_ms: f64,
    resumed_at: Option<Instant>,
}

/// A "video" whose frames are images played back at a fixed frame rate
pub struct FrameSequence {
    frames: Vec<RgbaImage>,
    fps: f64,
    playback: Mutex<Playback>,
}

impl FrameSequence {
    pub fn new(frames: Vec<RgbaImage>, fps: u32) -> Self {
        Self {
            frames,
            fps: fps.max(1) as f64,
            playback: Mutex::new(Playback {
                rate: 1.0,
                paused: true,
                position_ms: 0.0,
                resumed_at: None,
            }),
        }
    }

    /// Load every image in `dir`, ordered by file name
    pub fn load(dir: &Path, fps: u32) -> anyhow::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Cannot read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| MediaKind::from_file_name(n) == MediaKind::Image)
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            bail!("No .jpg or .png frames found in {}", dir.display());
        }

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            let frame = image::open(path)
                .with_context(|| format!("Cannot decode frame {}", path.display()))?
                .to_rgba8();
            frames.push(frame);
        }
        info!("Loaded {} frames from {}", frames.len(), dir.display());
        Ok(Self::new(frames, fps))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    fn position_ms(playback: &Playback) -> f64 {
        let running = playback
            .resumed_at
            .map(|t| t.elapsed().as_secs_f64() * 1000.0 * playback.rate as f64)
            .unwrap_or(0.0);
        playback.position_ms + running
    }

    fn index_at(&self, position_ms: f64) -> usize {
        (position_ms * self.fps / 1000.0).floor() as usize
    }

    pub fn is_ended(&self) -> bool {
        let playback = self.playback.lock();
        self.index_at(Self::position_ms(&playback)) >= self.frames.len()
    }

    fn settle(playback: &mut Playback) {
        playback.position_ms = Self::position_ms(playback);
        if playback.resumed_at.is_some() {
            playback.resumed_at = Some(Instant::now());
        }
    }
}

impl VideoSurface for FrameSequence {
    fn dimensions(&self) -> (u32, u32) {
        self.frames.first().map(|f| f.dimensions()).unwrap_or((0, 0))
    }

    fn is_paused(&self) -> bool {
        let paused = self.playback.lock().paused;
        paused || self.is_ended()
    }

    fn play(&self) -> Result<(), VisionError> {
        if self.frames.is_empty() {
            return Err(VisionError::InvalidState("No frames to play".to_string()));
        }
        let ended = self.is_ended();
        let mut playback = self.playback.lock();
        Self::settle(&mut playback);
        if ended {
            playback.position_ms = 0.0;
        }
        playback.paused = false;
        playback.resumed_at = Some(Instant::now());
        Ok(())
    }

    fn pause(&self) {
        let mut playback = self.playback.lock();
        Self::settle(&mut playback);
        playback.paused = true;
        playback.resumed_at = None;
    }

    fn set_playback_rate(&self, rate: f32) {
        let mut playback = self.playback.lock();
        Self::settle(&mut playback);
        playback.rate = rate;
    }

    fn snapshot(&self) -> Option<RgbaImage> {
        let playback = self.playback.lock();
        self.frames.get(self.index_at(Self::position_ms(&playback))).cloned()
    }
}

/// Hands out the already loaded frame sequence for any selected file
struct PreloadedVideo(Arc<FrameSequence>);

impl VideoLoader for PreloadedVideo {
    fn load(&self, _file: &MediaFile) -> Result<Arc<dyn VideoSurface>, VisionError> {
        Ok(self.0.clone())
    }
}

/// Raster canvas that ships a copy of every finished overlay to a writer
struct OverlayCanvas {
    inner: RasterCanvas,
    overlays: mpsc::UnboundedSender<RgbaImage>,
}

impl Canvas for OverlayCanvas {
    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.inner.resize(width, height);
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn draw_frame(&mut self, frame: &RgbaImage) {
        self.inner.draw_frame(frame);
    }

    fn draw_image_scaled(&mut self, image: &RgbaImage) {
        self.inner.draw_image_scaled(image);
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        self.inner.stroke_rect(rect, color, line_width);
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.inner.fill_rect(rect, color);
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
        debug!("Label {} at ({:.0}, {:.0})", text, x, y);
        self.inner.fill_text(text, x, y, color);
    }

    fn measure_text(&self, text: &str) -> f32 {
        self.inner.measure_text(text)
    }

    fn set_layer(&mut self, layer: Layer) {
        if layer == Layer::Overlay {
            let _ = self.overlays.send(self.inner.image().clone());
        }
        self.inner.set_layer(layer);
    }

    fn layer(&self) -> Layer {
        self.inner.layer()
    }

    fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, VisionError> {
        self.inner.encode_jpeg(quality)
    }
}

#[derive(Default)]
struct ReplayCounters {
    requests: AtomicU64,
    failures: AtomicU64,
    detections: AtomicU64,
    without_helmet: AtomicU64,
}

/// Backend decorator that tallies what the replay sent and got back
struct CountingBackend {
    inner: Arc<dyn DetectionBackend>,
    counters: Arc<ReplayCounters>,
}

#[async_trait::async_trait]
impl DetectionBackend for CountingBackend {
    async fn detect(&self, request: DetectRequest) -> Result<DetectionResult, VisionError> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let result = self.inner.detect(request).await;
        match &result {
            Ok(result) => {
                self.counters
                    .detections
                    .fetch_add(result.stats.total as u64, Ordering::Relaxed);
                self.counters
                    .without_helmet
                    .fetch_add(result.stats.without_helmet as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }
}

/// Totals reported after a replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub frames: usize,
    pub requests: u64,
    pub failures: u64,
    pub detections: u64,
    pub without_helmet: u64,
    pub overlays_written: usize,
}

/// How a frame directory is replayed
pub struct ReplayOptions {
    pub fps: u32,
    pub annotated: bool,
    pub output: Option<PathBuf>,
}

/// Play `dir` as a recorded video through the streaming pipeline
pub async fn run(
    config: VisorConfig,
    backend: Arc<dyn DetectionBackend>,
    dir: &Path,
    options: ReplayOptions,
) -> anyhow::Result<ReplaySummary> {
    let sequence = Arc::new(FrameSequence::load(dir, options.fps)?);
    run_sequence(config, backend, sequence, dir_name(dir), options).await
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("frames")
        .to_string()
}

async fn run_sequence(
    config: VisorConfig,
    backend: Arc<dyn DetectionBackend>,
    sequence: Arc<FrameSequence>,
    name: String,
    options: ReplayOptions,
) -> anyhow::Result<ReplaySummary> {
    if let Some(output) = &options.output {
        std::fs::create_dir_all(output)
            .with_context(|| format!("Cannot create output directory {}", output.display()))?;
    }

    let counters = Arc::new(ReplayCounters::default());
    let (tx, mut rx) = mpsc::unbounded_channel::<RgbaImage>();
    let writer = {
        let output = options.output.clone();
        tokio::spawn(async move {
            let mut written = 0usize;
            while let Some(overlay) = rx.recv().await {
                let Some(dir) = &output else { continue };
                let path = dir.join(format!("overlay_{:04}.png", written + 1));
                match overlay.save(&path) {
                    Ok(()) => written += 1,
                    Err(e) => warn!("Failed to write {}: {}", path.display(), e),
                }
            }
            written
        })
    };

    let host = HostServices {
        devices: Arc::new(NoCamera),
        video_loader: Arc::new(PreloadedVideo(sequence.clone())),
        store: Arc::new(MemoryStore::new()),
        notifier: Arc::new(LogNotifier),
        clock: Arc::new(MonotonicClock::new()),
    };
    let counting = Arc::new(CountingBackend {
        inner: backend,
        counters: counters.clone(),
    });
    let canvas = OverlayCanvas {
        inner: RasterCanvas::default(),
        overlays: tx,
    };
    let controller = CaptureModeController::new(config, counting, host, Box::new(canvas))?;
    controller.set_annotated(options.annotated);

    let file = MediaFile::new(name, "video/x-image-sequence", Bytes::new());
    controller.activate(CaptureRequest::RecordedVideo(file)).await?;

    loop {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let in_flight = controller
            .active_session()
            .await
            .map(|s| s.is_in_flight())
            .unwrap_or(false);
        if sequence.is_ended() && !in_flight {
            break;
        }
    }
    controller.deactivate().await;
    drop(controller);

    let overlays_written = writer.await.context("Overlay writer stopped unexpectedly")?;
    Ok(ReplaySummary {
        frames: sequence.len(),
        requests: counters.requests.load(Ordering::Relaxed),
        failures: counters.failures.load(Ordering::Relaxed),
        detections: counters.detections.load(Ordering::Relaxed),
        without_helmet: counters.without_helmet.load(Ordering::Relaxed),
        overlays_written,
    })
}
