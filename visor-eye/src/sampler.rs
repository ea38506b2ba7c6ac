//! Frame sampling: decides per tick whether a frame goes to the backend

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::SamplingConfig;
use crate::session::SourceSession;

/// Decision taken on a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Source is closed
    Inactive,
    /// Element has no frame to offer (paused, ended, no metadata yet)
    NotProducing,
    /// Not a multiple of the skip interval
    Skipped,
    /// Too soon after the previous dispatch
    Throttled,
    /// A request is already outstanding for this source
    Busy,
    /// The frame should be captured and dispatched
    Eligible,
}

/// Decides which rendering ticks of a streaming source turn into requests.
///
/// Only every `skip_interval`-th producing tick is considered, and never
/// sooner than `min_interval_ms` after the previous dispatch.
pub struct FrameSampler {
    skip_interval: u64,
    min_interval_ms: u64,
    clock: Arc<dyn Clock>,
}

impl FrameSampler {
    /// A skip interval of zero is treated as one
    pub fn new(config: &SamplingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            skip_interval: config.skip_interval.max(1),
            min_interval_ms: config.min_interval_ms,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Advance the source's frame budget by one tick.
    ///
    /// The counter only moves while the element is producing frames.
    pub fn tick(&self, session: &SourceSession, producing: bool) -> TickOutcome {
        if !session.is_live() {
            return TickOutcome::Inactive;
        }
        if !producing {
            return TickOutcome::NotProducing;
        }

        let now = self.clock.now_ms();
        let outcome = session.update_budget(|budget| {
            budget.frame_counter += 1;
            if budget.frame_counter % self.skip_interval != 0 {
                return TickOutcome::Skipped;
            }
            match budget.last_sent_ms {
                Some(last) if now.saturating_sub(last) < self.min_interval_ms => {
                    TickOutcome::Throttled
                }
                _ => TickOutcome::Eligible,
            }
        });

        if outcome == TickOutcome::Eligible && session.is_in_flight() {
            return TickOutcome::Busy;
        }
        outcome
    }
}
