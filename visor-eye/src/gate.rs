//! Single-flight gate: at most one outstanding request per source

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;
use visor_core::DetectionResult;

use crate::client::{DetectRequest, DetectionBackend};
use crate::error::VisionError;
use crate::session::SourceSession;

/// How a dispatched request ended
#[derive(Debug)]
pub enum DispatchOutcome {
    Completed(Result<DetectionResult, VisionError>),
    /// The source was torn down before the request settled
    Cancelled,
}

/// Exclusive right to have a request in flight for one source.
///
/// The in-flight flag is cleared when the permit is dropped.
#[derive(Debug)]
pub struct FlightPermit {
    session: Arc<SourceSession>,
}

impl FlightPermit {
    pub fn session(&self) -> &Arc<SourceSession> {
        &self.session
    }

    /// Issue `request`, abandoning it if the source dies first
    pub async fn dispatch(
        &self,
        backend: &dyn DetectionBackend,
        request: DetectRequest,
    ) -> DispatchOutcome {
        let token = self.session.token().clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Dropping request for closed {}", self.session.id());
                DispatchOutcome::Cancelled
            }
            result = backend.detect(request) => DispatchOutcome::Completed(result),
        }
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.session.in_flight.store(false, Ordering::SeqCst);
    }
}

impl SourceSession {
    /// Claim the in-flight slot and stamp the send time.
    ///
    /// Returns `None` if a request is already outstanding.
    pub fn try_begin_flight(self: &Arc<Self>, now_ms: u64) -> Option<FlightPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        self.update_budget(|budget| budget.last_sent_ms = Some(now_ms));
        Some(FlightPermit {
            session: Arc::clone(self),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use visor_core::CaptureMode;

    struct Pending;

    #[async_trait]
    impl DetectionBackend for Pending {
        async fn detect(&self, _request: DetectRequest) -> Result<DetectionResult, VisionError> {
            std::future::pending().await
        }
    }

    struct Failing;

    #[async_trait]
    impl DetectionBackend for Failing {
        async fn detect(&self, _request: DetectRequest) -> Result<DetectionResult, VisionError> {
            Err(VisionError::HttpStatus(500))
        }
    }

    fn request() -> DetectRequest {
        DetectRequest::frame(CaptureMode::Webcam, vec![0xff, 0xd8], false)
    }

    #[test]
    fn test_second_permit_refused() {
        let session = SourceSession::new(CaptureMode::Webcam);
        let permit = session.try_begin_flight(10).unwrap();
        assert!(session.is_in_flight());
        assert_eq!(session.budget().last_sent_ms, Some(10));
        assert!(session.try_begin_flight(20).is_none());
        // A refused attempt does not touch the send time
        assert_eq!(session.budget().last_sent_ms, Some(10));

        drop(permit);
        assert!(!session.is_in_flight());
        assert!(session.try_begin_flight(30).is_some());
    }

    #[tokio::test]
    async fn test_flag_cleared_after_failure() {
        let session = SourceSession::new(CaptureMode::Webcam);
        let permit = session.try_begin_flight(0).unwrap();
        let outcome = permit.dispatch(&Failing, request()).await;
        assert!(matches!(outcome, DispatchOutcome::Completed(Err(VisionError::HttpStatus(500)))));
        drop(permit);
        assert!(!session.is_in_flight());
    }

    #[tokio::test]
    async fn test_close_abandons_pending_request() {
        let session = SourceSession::new(CaptureMode::Video);
        let permit = session.try_begin_flight(0).unwrap();
        let closer = Arc::clone(&session);
        let task = tokio::spawn(async move {
            let outcome = permit.dispatch(&Pending, request()).await;
            matches!(outcome, DispatchOutcome::Cancelled)
        });
        tokio::task::yield_now().await;
        closer.close();
        assert!(task.await.unwrap());
        assert!(!session.is_in_flight());
    }
}
