//! Streaming detection loop: sample, capture, dispatch, render

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::client::{DetectRequest, DetectionBackend};
use crate::gate::{DispatchOutcome, FlightPermit};
use crate::overlay::RenderTarget;
use crate::platform::VideoSurface;
use crate::sampler::{FrameSampler, TickOutcome};
use crate::session::{LivenessToken, SourceSession};

/// Everything needed to turn ticks of one streaming source into detections
pub struct FramePipeline {
    session: Arc<SourceSession>,
    surface: Arc<dyn VideoSurface>,
    sampler: FrameSampler,
    backend: Arc<dyn DetectionBackend>,
    target: RenderTarget,
    jpeg_quality: u8,
    annotated: Arc<AtomicBool>,
}

impl FramePipeline {
    /// Bind a sampler, backend and render target to one streaming source
    pub fn new(
        session: Arc<SourceSession>,
        surface: Arc<dyn VideoSurface>,
        sampler: FrameSampler,
        backend: Arc<dyn DetectionBackend>,
        target: RenderTarget,
        jpeg_quality: u8,
        annotated: Arc<AtomicBool>,
    ) -> Self {
        Self {
            session,
            surface,
            sampler,
            backend,
            target,
            jpeg_quality,
            annotated,
        }
    }

    /// The session this pipeline feeds
    pub fn session(&self) -> &Arc<SourceSession> {
        &self.session
    }

    /// Handle one rendering tick.
    ///
    /// An eligible frame is captured and its request spawned; the tick itself
    /// never waits on the network. The result is only painted while both the
    /// session and `run` are live.
    pub fn on_tick(&self, run: &LivenessToken) -> TickOutcome {
        let outcome = self.sampler.tick(&self.session, self.surface.is_producing());
        if outcome != TickOutcome::Eligible {
            return outcome;
        }

        let Some(frame) = self.surface.snapshot() else {
            return TickOutcome::NotProducing;
        };
        let jpeg = match self.target.capture(&self.session, &frame, self.jpeg_quality) {
            Ok(Some(jpeg)) => jpeg,
            Ok(None) => return TickOutcome::Inactive,
            Err(e) => {
                warn!("Failed to capture frame for {}: {}", self.session.id(), e);
                return TickOutcome::NotProducing;
            }
        };

        let Some(permit) = self.session.try_begin_flight(self.sampler.clock().now_ms()) else {
            return TickOutcome::Busy;
        };
        let request = DetectRequest::frame(
            self.session.mode(),
            jpeg,
            self.annotated.load(Ordering::Relaxed),
        );
        self.spawn_dispatch(permit, run.clone(), request);
        TickOutcome::Eligible
    }

    fn spawn_dispatch(
        &self,
        permit: FlightPermit,
        run: LivenessToken,
        request: DetectRequest,
    ) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let target = self.target.clone();
        tokio::spawn(async move {
            let session = Arc::clone(permit.session());
            match permit.dispatch(backend.as_ref(), request).await {
                DispatchOutcome::Completed(Ok(result)) => {
                    if let Err(e) = target.render_if_live(&session, &run, &result) {
                        warn!("Failed to render result for {}: {}", session.id(), e);
                    }
                }
                DispatchOutcome::Completed(Err(e)) => {
                    warn!("Detection failed for {}: {}", session.id(), e);
                }
                DispatchOutcome::Cancelled => {}
            }
            drop(permit);
        })
    }
}

/// A running tick loop bound to one pipeline
#[derive(Debug)]
pub struct SamplerLoop {
    token: LivenessToken,
    handle: JoinHandle<()>,
}

impl SamplerLoop {
    /// Drive `pipeline` once per `period` until stopped or its source closes
    pub fn spawn(pipeline: Arc<FramePipeline>, period: Duration) -> Self {
        let token = LivenessToken::new();
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            let source = pipeline.session().token().clone();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = source.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                // A tick that was already scheduled must not act on a dead source
                if !loop_token.is_live() || !source.is_live() {
                    break;
                }
                pipeline.on_tick(&loop_token);
            }
            debug!("Sampler loop for {} stopped", pipeline.session().id());
        });

        Self { token, handle }
    }

    /// Whether the loop is still ticking
    pub fn is_running(&self) -> bool {
        self.token.is_live() && !self.handle.is_finished()
    }

    /// Stop ticking. Results of requests already in flight are discarded.
    pub fn stop(self) {
        self.token.cancel();
        self.handle.abort();
    }
}
