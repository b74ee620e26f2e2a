//! Periodic rip progress polling

use crate::cd::engine::{PipelineEngine, StreamState};
use std::time::Duration;
use tokio::time::Instant;

/// How often the source position is sampled while ripping
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Poll timer for the active rip.
///
/// The monitor only tracks the next deadline; the session's event loop waits
/// on [`ProgressMonitor::tick`] next to the message bus, so ticks and bus
/// messages are handled by the same task.
#[derive(Debug)]
pub struct ProgressMonitor {
    period: Duration,
    next_tick: Option<Instant>,
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new(PROGRESS_INTERVAL)
    }
}

impl ProgressMonitor {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_tick: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Start ticking. Returns false if the monitor was already running.
    pub fn start(&mut self) -> bool {
        if self.next_tick.is_some() {
            return false;
        }
        self.next_tick = Some(Instant::now() + self.period);
        true
    }

    /// Stop ticking. Returns false if the monitor was already stopped.
    pub fn stop(&mut self) -> bool {
        self.next_tick.take().is_some()
    }

    /// Wait for the next tick. Never resolves while the monitor is stopped.
    ///
    /// Cancel safe: dropping the future before it resolves leaves the
    /// deadline untouched.
    pub async fn tick(&mut self) {
        let Some(deadline) = self.next_tick else {
            return std::future::pending().await;
        };

        tokio::time::sleep_until(deadline).await;

        // A slow loop skips missed ticks instead of bursting to catch up
        let now = Instant::now();
        let mut next = deadline + self.period;
        if next <= now {
            next = now + self.period;
        }
        self.next_tick = Some(next);
    }
}

/// Elapsed milliseconds of the rip, or None when this tick should be skipped
/// (pipeline not playing yet, or the source cannot answer a position query)
pub fn sample_position<E: PipelineEngine>(
    engine: &E,
    graph: &E::Graph,
    source: &E::Stage,
) -> Option<u64> {
    if engine.graph_state(graph) != StreamState::Playing {
        return None;
    }

    let position = engine.query_position(source)?;
    Some(position.as_millis() as u64)
}
