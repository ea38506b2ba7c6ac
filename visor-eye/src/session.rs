//! Per-source state: identity, frame budget, in-flight flag and liveness

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use visor_core::CaptureMode;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one activation of a capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a fresh id, unique for the life of the process
    pub fn next() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, as used in logs
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source-{}", self.0)
    }
}

/// Sampling bookkeeping of a single source
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameBudget {
    /// Ticks observed while the source was producing frames
    pub frame_counter: u64,
    /// Clock reading of the last dispatch; `None` until the first one
    pub last_sent_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation handle shared by everything bound to a source
#[derive(Debug, Clone, Default)]
pub struct LivenessToken {
    state: Arc<TokenState>,
}

impl LivenessToken {
    /// A token that starts out live
    pub fn new() -> Self {
        Self::default()
    }

    /// False once [`cancel`](Self::cancel) was called on any clone
    pub fn is_live(&self) -> bool {
        !self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel the token and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            self.state.notify.notify_waiters();
        }
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if !self.is_live() {
                return;
            }
            notified.await;
        }
    }
}

/// Everything owned by one activated source
#[derive(Debug)]
pub struct SourceSession {
    id: SourceId,
    mode: CaptureMode,
    budget: Mutex<FrameBudget>,
    pub(crate) in_flight: AtomicBool,
    token: LivenessToken,
}

impl SourceSession {
    /// Start a live session with an empty budget and a free gate
    pub fn new(mode: CaptureMode) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::next(),
            mode,
            budget: Mutex::new(FrameBudget::default()),
            in_flight: AtomicBool::new(false),
            token: LivenessToken::new(),
        })
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Snapshot of the sampling counters
    pub fn budget(&self) -> FrameBudget {
        *self.budget.lock()
    }

    pub(crate) fn update_budget<R>(&self, f: impl FnOnce(&mut FrameBudget) -> R) -> R {
        f(&mut self.budget.lock())
    }

    /// Whether a detection request for this source is outstanding
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// False once the session was closed
    pub fn is_live(&self) -> bool {
        self.token.is_live()
    }

    /// Token cancelled when the session closes
    pub fn token(&self) -> &LivenessToken {
        &self.token
    }

    /// Mark the source dead; pending work bound to it becomes stale
    pub fn close(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_source_ids_are_unique() {
        let a = SourceSession::new(CaptureMode::Webcam);
        let b = SourceSession::new(CaptureMode::Webcam);
        assert_ne!(a.id(), b.id());
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_new_session_state() {
        let session = SourceSession::new(CaptureMode::Video);
        assert_eq!(session.mode(), CaptureMode::Video);
        assert_eq!(session.budget(), FrameBudget::default());
        assert!(!session.is_in_flight());
        assert!(session.is_live());
    }

    #[test]
    fn test_close_is_idempotent() {
        let session = SourceSession::new(CaptureMode::Video);
        session.close();
        session.close();
        assert!(!session.is_live());
    }

    #[test]
    fn test_cancelled_after_cancel() {
        let token = LivenessToken::new();
        token.cancel();
        tokio_test::block_on(token.cancelled());
        assert!(!token.is_live());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = LivenessToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
